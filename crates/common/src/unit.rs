//! Compiled units and their binary container.
//!
//! A compiled unit is the code buffer plus the parallel tables the
//! dispatch loop consults: literals, exception ranges, local names,
//! foreach descriptors and the command-location map.
//!
//! # Container layout (`.qbc`)
//!
//! ```text
//! "QBC1"
//! code        u32 length, bytes
//! literals    u32 count, { u32 length, UTF-8 }
//! ranges      u32 count, { u8 kind, u32 level, u32 start, u32 length,
//!                          u32 break, u32 continue, u32 catch }
//! max stack   u32
//! locals      u32 count, { u32 length, UTF-8 }
//! foreach     u32 count, { u32 counter, u32 lists, { u32 temp, u32 vars, u32* } }
//! commands    u32 count, { u32 code start, u32 code length, u32 src start, u32 src length }
//! source      u8 present, [u32 length, UTF-8]
//! digest      32 bytes, blake3 of everything above
//! ```
//!
//! All integers are little-endian. Absent range targets are `u32::MAX`.

use crate::error::DecodeError;
use crate::value::Value;

const MAGIC: &[u8; 4] = b"QBC1";
const NO_TARGET: u32 = u32::MAX;
const DIGEST_LEN: usize = 32;

/// Kind of an exception range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// Handles break and continue.
    Loop,
    /// Handles every non-normal completion code.
    Catch,
}

/// A code interval with its break/continue/catch targets.
///
/// Ranges appear in the unit's table in nesting order: an enclosed range
/// always comes after the ranges that enclose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRange {
    pub kind: RangeKind,
    pub nesting_level: u32,
    pub code_start: u32,
    pub code_len: u32,
    pub break_target: Option<u32>,
    pub continue_target: Option<u32>,
    pub catch_target: Option<u32>,
}

impl ExceptionRange {
    pub fn contains(&self, pc: usize) -> bool {
        let start = self.code_start as usize;
        pc >= start && pc < start + self.code_len as usize
    }

    pub fn code_end(&self) -> u32 {
        self.code_start + self.code_len
    }

    /// Whether `other` lies entirely inside this range.
    pub fn encloses(&self, other: &ExceptionRange) -> bool {
        other.code_start >= self.code_start && other.code_end() <= self.code_end()
    }
}

/// Maps a code interval to the source text it was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdLocation {
    pub code_offset: u32,
    pub code_len: u32,
    pub src_offset: u32,
    pub src_len: u32,
}

/// One value list of a foreach loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeachList {
    /// Local slot holding the list being iterated.
    pub temp_slot: u32,
    /// Local slots assigned on each iteration.
    pub vars: Vec<u32>,
}

/// Auxiliary data for `FOREACH_START4`/`FOREACH_STEP4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeachInfo {
    /// Local slot holding the iteration counter.
    pub loop_counter_slot: u32,
    pub lists: Vec<ForeachList>,
}

/// A unit of compiled code ready for execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledUnit {
    pub code: Vec<u8>,
    pub literals: Vec<Value>,
    pub ranges: Vec<ExceptionRange>,
    pub max_stack_depth: u32,
    pub locals: Vec<String>,
    pub foreach_infos: Vec<ForeachInfo>,
    pub cmd_locations: Vec<CmdLocation>,
    pub source: Option<String>,
}

impl CompiledUnit {
    /// The innermost command location covering `pc`.
    pub fn command_at(&self, pc: usize) -> Option<&CmdLocation> {
        self.cmd_locations
            .iter()
            .filter(|loc| {
                let start = loc.code_offset as usize;
                pc >= start && pc < start + loc.code_len as usize
            })
            .min_by_key(|loc| loc.code_len)
    }

    /// Source text for a command location, if the unit carries source.
    pub fn snippet(&self, loc: &CmdLocation) -> Option<&str> {
        let start = loc.src_offset as usize;
        self.source
            .as_deref()?
            .get(start..start + loc.src_len as usize)
    }

    /// Serialize to the container format.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.bytes(MAGIC);
        w.u32(self.code.len() as u32);
        w.bytes(&self.code);

        w.u32(self.literals.len() as u32);
        for lit in &self.literals {
            w.string(lit.as_str());
        }

        w.u32(self.ranges.len() as u32);
        for r in &self.ranges {
            w.u8(match r.kind {
                RangeKind::Loop => 0,
                RangeKind::Catch => 1,
            });
            w.u32(r.nesting_level);
            w.u32(r.code_start);
            w.u32(r.code_len);
            for target in [r.break_target, r.continue_target, r.catch_target] {
                w.u32(target.unwrap_or(NO_TARGET));
            }
        }

        w.u32(self.max_stack_depth);

        w.u32(self.locals.len() as u32);
        for name in &self.locals {
            w.string(name);
        }

        w.u32(self.foreach_infos.len() as u32);
        for info in &self.foreach_infos {
            w.u32(info.loop_counter_slot);
            w.u32(info.lists.len() as u32);
            for list in &info.lists {
                w.u32(list.temp_slot);
                w.u32(list.vars.len() as u32);
                for v in &list.vars {
                    w.u32(*v);
                }
            }
        }

        w.u32(self.cmd_locations.len() as u32);
        for loc in &self.cmd_locations {
            w.u32(loc.code_offset);
            w.u32(loc.code_len);
            w.u32(loc.src_offset);
            w.u32(loc.src_len);
        }

        match &self.source {
            Some(text) => {
                w.u8(1);
                w.string(text);
            }
            None => w.u8(0),
        }

        let digest = blake3::hash(&w.out);
        w.bytes(digest.as_bytes());
        w.out
    }

    /// Deserialize from the container format, checking the digest.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        if bytes.len() < MAGIC.len() + DIGEST_LEN {
            return Err(DecodeError::UnexpectedEof { section: "digest" });
        }
        let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
        if blake3::hash(body).as_bytes() != digest {
            return Err(DecodeError::ChecksumMismatch);
        }

        let mut r = Reader {
            data: body,
            pos: MAGIC.len(),
        };

        let code_len = r.u32("code")? as usize;
        let code = r.take(code_len, "code")?.to_vec();

        let literals = (0..r.u32("literals")?)
            .map(|_| r.string("literals").map(Value::from))
            .collect::<Result<Vec<_>, _>>()?;

        let range_count = r.u32("ranges")?;
        let mut ranges = Vec::new();
        for _ in 0..range_count {
            let kind = match r.u8("ranges")? {
                0 => RangeKind::Loop,
                1 => RangeKind::Catch,
                other => return Err(DecodeError::InvalidRangeKind(other)),
            };
            let nesting_level = r.u32("ranges")?;
            let code_start = r.u32("ranges")?;
            let code_len = r.u32("ranges")?;
            let mut target = || r.u32("ranges").map(|t| (t != NO_TARGET).then_some(t));
            let break_target = target()?;
            let continue_target = target()?;
            let catch_target = target()?;
            ranges.push(ExceptionRange {
                kind,
                nesting_level,
                code_start,
                code_len,
                break_target,
                continue_target,
                catch_target,
            });
        }

        let max_stack_depth = r.u32("max stack")?;

        let locals = (0..r.u32("locals")?)
            .map(|_| r.string("locals"))
            .collect::<Result<Vec<_>, _>>()?;

        let foreach_count = r.u32("foreach")?;
        let mut foreach_infos = Vec::new();
        for _ in 0..foreach_count {
            let loop_counter_slot = r.u32("foreach")?;
            let list_count = r.u32("foreach")?;
            let mut lists = Vec::new();
            for _ in 0..list_count {
                let temp_slot = r.u32("foreach")?;
                let vars = (0..r.u32("foreach")?)
                    .map(|_| r.u32("foreach"))
                    .collect::<Result<Vec<_>, _>>()?;
                lists.push(ForeachList { temp_slot, vars });
            }
            foreach_infos.push(ForeachInfo {
                loop_counter_slot,
                lists,
            });
        }

        let cmd_count = r.u32("commands")?;
        let mut cmd_locations = Vec::new();
        for _ in 0..cmd_count {
            cmd_locations.push(CmdLocation {
                code_offset: r.u32("commands")?,
                code_len: r.u32("commands")?,
                src_offset: r.u32("commands")?,
                src_len: r.u32("commands")?,
            });
        }

        let source = match r.u8("source")? {
            0 => None,
            _ => Some(r.string("source")?),
        };

        Ok(CompiledUnit {
            code,
            literals,
            ranges,
            max_stack_depth,
            locals,
            foreach_infos,
            cmd_locations,
            source,
        })
    }

    /// Hex blake3 digest of the encoded container.
    pub fn digest(&self) -> String {
        blake3::hash(&self.encode()).to_hex().to_string()
    }
}

#[derive(Default)]
struct Writer {
    out: Vec<u8>,
}

impl Writer {
    fn bytes(&mut self, b: &[u8]) {
        self.out.extend_from_slice(b);
    }

    fn u8(&mut self, v: u8) {
        self.out.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.bytes(s.as_bytes());
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, section: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof { section })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, section: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, section)?[0])
    }

    fn u32(&mut self, section: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(4, section)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, section: &'static str) -> Result<String, DecodeError> {
        let len = self.u32(section)? as usize;
        let bytes = self.take(len, section)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { section })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompiledUnit {
        CompiledUnit {
            code: vec![0x01, 0x00, 0x00],
            literals: vec![Value::from("hello world")],
            ranges: vec![ExceptionRange {
                kind: RangeKind::Catch,
                nesting_level: 0,
                code_start: 0,
                code_len: 2,
                break_target: None,
                continue_target: None,
                catch_target: Some(2),
            }],
            max_stack_depth: 1,
            locals: vec!["x".to_string()],
            foreach_infos: vec![ForeachInfo {
                loop_counter_slot: 0,
                lists: vec![ForeachList {
                    temp_slot: 0,
                    vars: vec![0],
                }],
            }],
            cmd_locations: vec![CmdLocation {
                code_offset: 0,
                code_len: 3,
                src_offset: 0,
                src_len: 5,
            }],
            source: Some("hello".to_string()),
        }
    }

    #[test]
    fn container_roundtrip() {
        let unit = sample();
        assert_eq!(CompiledUnit::decode(&unit.encode()).unwrap(), unit);
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let mut bytes = sample().encode();
        bytes[6] ^= 0xff;
        assert_eq!(
            CompiledUnit::decode(&bytes),
            Err(DecodeError::ChecksumMismatch)
        );
    }

    #[test]
    fn bad_magic() {
        assert_eq!(CompiledUnit::decode(b"NOPE"), Err(DecodeError::BadMagic));
    }

    #[test]
    fn truncated_section_reports_name() {
        let mut body = Vec::new();
        body.extend_from_slice(MAGIC);
        body.extend_from_slice(&10u32.to_le_bytes());
        body.push(0x00);
        let digest = blake3::hash(&body);
        body.extend_from_slice(digest.as_bytes());
        assert_eq!(
            CompiledUnit::decode(&body),
            Err(DecodeError::UnexpectedEof { section: "code" })
        );
    }

    #[test]
    fn innermost_command_wins() {
        let mut unit = sample();
        unit.source = Some("outer [inner]".to_string());
        unit.cmd_locations = vec![
            CmdLocation {
                code_offset: 0,
                code_len: 10,
                src_offset: 0,
                src_len: 13,
            },
            CmdLocation {
                code_offset: 2,
                code_len: 3,
                src_offset: 7,
                src_len: 5,
            },
        ];
        let loc = unit.command_at(3).unwrap();
        assert_eq!(unit.snippet(loc), Some("inner"));
        let loc = unit.command_at(8).unwrap();
        assert_eq!(unit.snippet(loc), Some("outer [inner]"));
        assert!(unit.command_at(10).is_none());
    }

    #[test]
    fn range_containment() {
        let outer = ExceptionRange {
            kind: RangeKind::Catch,
            nesting_level: 0,
            code_start: 0,
            code_len: 10,
            break_target: None,
            continue_target: None,
            catch_target: Some(10),
        };
        let inner = ExceptionRange {
            kind: RangeKind::Loop,
            nesting_level: 1,
            code_start: 2,
            code_len: 4,
            break_target: Some(6),
            continue_target: None,
            catch_target: None,
        };
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
        assert!(inner.contains(2) && inner.contains(5) && !inner.contains(6));
    }
}
