//! Binary program codec.
//!
//! File layout: `"RPGM"` magic followed by the serialized root sequence.
//! Every node is `[varint type-id][varint span-start][varint span-end][payload]`;
//! integers are little-endian, strings are `[varint len][utf-8 bytes]`, and
//! child nodes recurse. Unknown type ids are a hard error.

use std::{error::Error, fmt::Display, rc::Rc};

use crate::InternalString;
use crate::lang::*;
use crate::query::{Carrier, CarrierKind, ClassFilterRule, Query, RegexFilterRule, SyllableRange};

/// Magic bytes opening every compiled program file.
pub const PROGRAM_MAGIC: &[u8; 4] = b"RPGM";

// Stable node type ids. These are part of the file format; never reuse one.
const ID_NOP: u64 = 0;
const ID_FRAGMENT: u64 = 1;
const ID_WHITESPACE: u64 = 2;
const ID_INTEGER: u64 = 3;
const ID_SEQUENCE: u64 = 4;
const ID_BLOCK: u64 = 5;
const ID_TAG: u64 = 6;
const ID_QUERY: u64 = 7;
const ID_VAR_GET: u64 = 8;
const ID_VAR_SET: u64 = 9;
const ID_SUB_DEF: u64 = 10;
const ID_SUB_CALL: u64 = 11;
const ID_CONDITIONAL: u64 = 12;
const ID_ARITH: u64 = 13;
const ID_LIST_INIT: u64 = 14;
const ID_CHANNEL: u64 = 15;
const ID_MARK: u64 = 16;
const ID_DIST: u64 = 17;
const ID_DEF_TARGET: u64 = 18;
const ID_SEND: u64 = 19;
const ID_REPLACE: u64 = 20;
const ID_CHAR_GEN: u64 = 21;
const ID_ARTICLE: u64 = 22;

/// Why a program file failed to load.
#[derive(Debug, PartialEq)]
pub enum ProgramLoadError {
  /// The file does not open with the program magic.
  BadMagic,
  /// The file names a node type this implementation does not know.
  UnknownTypeId(u64),
  /// The file ended in the middle of a structure.
  UnexpectedEnd,
  /// A payload failed validation.
  InvalidData(&'static str),
}

impl Display for ProgramLoadError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::BadMagic => write!(f, "bad magic"),
      Self::UnknownTypeId(id) => write!(f, "unknown node type id: {}", id),
      Self::UnexpectedEnd => write!(f, "unexpected end of program data"),
      Self::InvalidData(what) => write!(f, "invalid program data: {}", what),
    }
  }
}

impl Error for ProgramLoadError {}

type LoadResult<T> = Result<T, ProgramLoadError>;

/// Serializes a root sequence into program file bytes.
pub(crate) fn encode_program(root: &Sequence) -> Vec<u8> {
  let mut out = Vec::with_capacity(256);
  out.extend_from_slice(PROGRAM_MAGIC);
  write_seq(&mut out, root);
  out
}

/// Deserializes program file bytes back into a root sequence.
pub(crate) fn decode_program(bytes: &[u8]) -> LoadResult<Sequence> {
  if bytes.len() < PROGRAM_MAGIC.len() || bytes[..PROGRAM_MAGIC.len()] != PROGRAM_MAGIC[..] {
    return Err(ProgramLoadError::BadMagic)
  }
  let mut reader = ByteReader::new(&bytes[PROGRAM_MAGIC.len()..]);
  let seq = read_seq(&mut reader)?;
  if !reader.at_end() {
    return Err(ProgramLoadError::InvalidData("trailing bytes after root sequence"))
  }
  Ok(seq)
}

// ================================================================
// Primitives
// ================================================================

struct ByteReader<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> ByteReader<'a> {
  fn new(bytes: &'a [u8]) -> Self {
    Self { bytes, pos: 0 }
  }

  fn at_end(&self) -> bool {
    self.pos >= self.bytes.len()
  }

  fn read_u8(&mut self) -> LoadResult<u8> {
    let b = *self.bytes.get(self.pos).ok_or(ProgramLoadError::UnexpectedEnd)?;
    self.pos += 1;
    Ok(b)
  }

  fn read_bool(&mut self) -> LoadResult<bool> {
    match self.read_u8()? {
      0 => Ok(false),
      1 => Ok(true),
      _ => Err(ProgramLoadError::InvalidData("boolean out of range")),
    }
  }

  fn read_exact(&mut self, len: usize) -> LoadResult<&'a [u8]> {
    if self.pos + len > self.bytes.len() {
      return Err(ProgramLoadError::UnexpectedEnd)
    }
    let slice = &self.bytes[self.pos..self.pos + len];
    self.pos += len;
    Ok(slice)
  }

  fn read_varint(&mut self) -> LoadResult<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
      let byte = self.read_u8()?;
      if shift >= 64 {
        return Err(ProgramLoadError::InvalidData("varint too long"))
      }
      value |= ((byte & 0x7f) as u64) << shift;
      if byte & 0x80 == 0 {
        return Ok(value)
      }
      shift += 7;
    }
  }

  fn read_len(&mut self) -> LoadResult<usize> {
    Ok(self.read_varint()? as usize)
  }

  fn read_i64(&mut self) -> LoadResult<i64> {
    Ok(zigzag_decode(self.read_varint()?))
  }

  fn read_f64(&mut self) -> LoadResult<f64> {
    let mut bits = [0u8; 8];
    bits.copy_from_slice(self.read_exact(8)?);
    Ok(f64::from_le_bytes(bits))
  }

  fn read_string(&mut self) -> LoadResult<InternalString> {
    let len = self.read_len()?;
    let bytes = self.read_exact(len)?;
    match std::str::from_utf8(bytes) {
      Ok(s) => Ok(InternalString::from(s)),
      Err(_) => Err(ProgramLoadError::InvalidData("string is not valid UTF-8")),
    }
  }

  fn read_ident(&mut self) -> LoadResult<Identifier> {
    Ok(Identifier::new(self.read_string()?))
  }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
  loop {
    let byte = (value & 0x7f) as u8;
    value >>= 7;
    if value == 0 {
      out.push(byte);
      return
    }
    out.push(byte | 0x80);
  }
}

fn zigzag_encode(n: i64) -> u64 {
  ((n << 1) ^ (n >> 63)) as u64
}

fn zigzag_decode(n: u64) -> i64 {
  ((n >> 1) as i64) ^ -((n & 1) as i64)
}

fn write_i64(out: &mut Vec<u8>, n: i64) {
  write_varint(out, zigzag_encode(n));
}

fn write_f64(out: &mut Vec<u8>, n: f64) {
  out.extend_from_slice(&n.to_le_bytes());
}

fn write_bool(out: &mut Vec<u8>, b: bool) {
  out.push(b as u8);
}

fn write_string(out: &mut Vec<u8>, s: &str) {
  write_varint(out, s.len() as u64);
  out.extend_from_slice(s.as_bytes());
}

// ================================================================
// Nodes
// ================================================================

fn write_seq(out: &mut Vec<u8>, seq: &Sequence) {
  write_varint(out, seq.len() as u64);
  for rst in seq.iter() {
    write_node(out, rst);
  }
}

fn read_seq(reader: &mut ByteReader) -> LoadResult<Sequence> {
  let len = reader.read_len()?;
  let mut nodes = Vec::with_capacity(len.min(1024));
  for _ in 0..len {
    nodes.push(Rc::new(read_node(reader)?));
  }
  Ok(Sequence::new(nodes))
}

fn write_node(out: &mut Vec<u8>, rst: &Rst) {
  let id = match &rst.kind {
    RstKind::Nop => ID_NOP,
    RstKind::Fragment(_) => ID_FRAGMENT,
    RstKind::Whitespace(_) => ID_WHITESPACE,
    RstKind::Integer(_) => ID_INTEGER,
    RstKind::Sequence(_) => ID_SEQUENCE,
    RstKind::Block(_) => ID_BLOCK,
    RstKind::Tag(_) => ID_TAG,
    RstKind::Query(_) => ID_QUERY,
    RstKind::VarGet(_) => ID_VAR_GET,
    RstKind::VarSet(..) => ID_VAR_SET,
    RstKind::SubDef(_) => ID_SUB_DEF,
    RstKind::SubCall(_) => ID_SUB_CALL,
    RstKind::Conditional(_) => ID_CONDITIONAL,
    RstKind::Arith { .. } => ID_ARITH,
    RstKind::ListInit(_) => ID_LIST_INIT,
    RstKind::Channel { .. } => ID_CHANNEL,
    RstKind::Mark(_) => ID_MARK,
    RstKind::Dist(..) => ID_DIST,
    RstKind::DefTarget(_) => ID_DEF_TARGET,
    RstKind::Send(..) => ID_SEND,
    RstKind::Replace(_) => ID_REPLACE,
    RstKind::CharGen { .. } => ID_CHAR_GEN,
    RstKind::Article => ID_ARTICLE,
  };
  write_varint(out, id);
  write_varint(out, rst.span.start as u64);
  write_varint(out, rst.span.end as u64);

  match &rst.kind {
    RstKind::Nop | RstKind::Article => {},
    RstKind::Fragment(s) | RstKind::Whitespace(s) => write_string(out, s.as_str()),
    RstKind::Integer(n) => write_i64(out, *n),
    RstKind::Sequence(seq) => write_seq(out, seq),
    RstKind::Block(block) => {
      write_varint(out, block.branches.len() as u64);
      for branch in &block.branches {
        match branch.weight {
          Some(weight) => {
            write_bool(out, true);
            write_f64(out, weight);
          },
          None => write_bool(out, false),
        }
        write_seq(out, &branch.body);
      }
    },
    RstKind::Tag(call) => {
      write_string(out, call.name.as_str());
      write_varint(out, call.args.len() as u64);
      for arg in &call.args {
        match arg {
          FunctionArg::Cooked(seq) => {
            out.push(0);
            write_seq(out, seq);
          },
          FunctionArg::Raw(seq) => {
            out.push(1);
            write_seq(out, seq);
          },
        }
      }
    },
    RstKind::Query(query) => write_query(out, query),
    RstKind::VarGet(name) => write_string(out, name.as_str()),
    RstKind::VarSet(name, value) => {
      write_string(out, name.as_str());
      write_seq(out, value);
    },
    RstKind::SubDef(def) => {
      write_string(out, def.name.as_str());
      write_varint(out, def.params.len() as u64);
      for param in &def.params {
        write_string(out, param.as_str());
      }
      write_seq(out, &def.body);
    },
    RstKind::SubCall(call) => {
      write_string(out, call.name.as_str());
      write_varint(out, call.args.len() as u64);
      for arg in &call.args {
        write_seq(out, arg);
      }
    },
    RstKind::Conditional(cond) => {
      write_seq(out, &cond.condition);
      write_bool(out, cond.negate);
      write_seq(out, &cond.then_body);
      match &cond.else_body {
        Some(else_body) => {
          write_bool(out, true);
          write_seq(out, else_body);
        },
        None => write_bool(out, false),
      }
    },
    RstKind::Arith { op, operands } => {
      out.push(*op as u8);
      write_varint(out, operands.len() as u64);
      for operand in operands {
        write_seq(out, operand);
      }
    },
    RstKind::ListInit(elements) => {
      write_varint(out, elements.len() as u64);
      for element in elements.iter() {
        write_seq(out, element);
      }
    },
    RstKind::Channel { name, visibility, body } => {
      write_string(out, name.as_str());
      out.push(*visibility as u8);
      write_seq(out, body);
    },
    RstKind::Mark(name) | RstKind::DefTarget(name) => write_string(out, name.as_str()),
    RstKind::Dist(a, b) => {
      write_string(out, a.as_str());
      write_string(out, b.as_str());
    },
    RstKind::Send(name, value) => {
      write_string(out, name.as_str());
      write_seq(out, value);
    },
    RstKind::Replace(replacer) => {
      write_string(out, replacer.pattern.pattern());
      write_bool(out, replacer.pattern.is_case_insensitive());
      write_seq(out, &replacer.subject);
      write_seq(out, &replacer.replacement);
    },
    RstKind::CharGen { class, count } => {
      out.push(class.code() as u8);
      write_varint(out, *count as u64);
    },
  }
}

fn read_node(reader: &mut ByteReader) -> LoadResult<Rst> {
  let id = reader.read_varint()?;
  let span_start = reader.read_varint()? as usize;
  let span_end = reader.read_varint()? as usize;
  let span = span_start..span_end;

  let kind = match id {
    ID_NOP => RstKind::Nop,
    ID_ARTICLE => RstKind::Article,
    ID_FRAGMENT => RstKind::Fragment(reader.read_string()?),
    ID_WHITESPACE => RstKind::Whitespace(reader.read_string()?),
    ID_INTEGER => RstKind::Integer(reader.read_i64()?),
    ID_SEQUENCE => RstKind::Sequence(Rc::new(read_seq(reader)?)),
    ID_BLOCK => {
      let branch_count = reader.read_len()?;
      let mut branches = Vec::with_capacity(branch_count.min(1024));
      for _ in 0..branch_count {
        let weight = if reader.read_bool()? {
          Some(reader.read_f64()?)
        } else {
          None
        };
        branches.push(BlockBranch {
          weight,
          body: Rc::new(read_seq(reader)?),
        });
      }
      RstKind::Block(Rc::new(Block::new(branches)))
    },
    ID_TAG => {
      let name = reader.read_ident()?;
      let argc = reader.read_len()?;
      let mut args = Vec::with_capacity(argc.min(1024));
      for _ in 0..argc {
        let mode = reader.read_u8()?;
        let seq = Rc::new(read_seq(reader)?);
        args.push(match mode {
          0 => FunctionArg::Cooked(seq),
          1 => FunctionArg::Raw(seq),
          _ => return Err(ProgramLoadError::InvalidData("argument mode out of range")),
        });
      }
      RstKind::Tag(FunctionCall { name, args })
    },
    ID_QUERY => RstKind::Query(Rc::new(read_query(reader)?)),
    ID_VAR_GET => RstKind::VarGet(reader.read_ident()?),
    ID_VAR_SET => RstKind::VarSet(reader.read_ident()?, Rc::new(read_seq(reader)?)),
    ID_SUB_DEF => {
      let name = reader.read_ident()?;
      let param_count = reader.read_len()?;
      let mut params = Vec::with_capacity(param_count.min(1024));
      for _ in 0..param_count {
        params.push(reader.read_ident()?);
      }
      RstKind::SubDef(Rc::new(SubroutineDef {
        name,
        params,
        body: Rc::new(read_seq(reader)?),
      }))
    },
    ID_SUB_CALL => {
      let name = reader.read_ident()?;
      let argc = reader.read_len()?;
      let mut args = Vec::with_capacity(argc.min(1024));
      for _ in 0..argc {
        args.push(Rc::new(read_seq(reader)?));
      }
      RstKind::SubCall(SubroutineCall { name, args })
    },
    ID_CONDITIONAL => {
      let condition = Rc::new(read_seq(reader)?);
      let negate = reader.read_bool()?;
      let then_body = Rc::new(read_seq(reader)?);
      let else_body = if reader.read_bool()? {
        Some(Rc::new(read_seq(reader)?))
      } else {
        None
      };
      RstKind::Conditional(Conditional { condition, negate, then_body, else_body })
    },
    ID_ARITH => {
      let op = match reader.read_u8()? {
        0 => ArithOp::Add,
        1 => ArithOp::Sub,
        2 => ArithOp::Mul,
        3 => ArithOp::Div,
        4 => ArithOp::Mod,
        5 => ArithOp::Neg,
        _ => return Err(ProgramLoadError::InvalidData("arithmetic operator out of range")),
      };
      let operand_count = reader.read_len()?;
      if operand_count != op.operand_count() {
        return Err(ProgramLoadError::InvalidData("arithmetic operand count mismatch"))
      }
      let mut operands = Vec::with_capacity(operand_count);
      for _ in 0..operand_count {
        operands.push(Rc::new(read_seq(reader)?));
      }
      RstKind::Arith { op, operands }
    },
    ID_LIST_INIT => {
      let len = reader.read_len()?;
      let mut elements = Vec::with_capacity(len.min(1024));
      for _ in 0..len {
        elements.push(Rc::new(read_seq(reader)?));
      }
      RstKind::ListInit(Rc::new(elements))
    },
    ID_CHANNEL => {
      let name = reader.read_ident()?;
      let visibility = match reader.read_u8()? {
        0 => ChannelVisibility::Public,
        1 => ChannelVisibility::Private,
        2 => ChannelVisibility::Internal,
        _ => return Err(ProgramLoadError::InvalidData("channel visibility out of range")),
      };
      RstKind::Channel {
        name,
        visibility,
        body: Rc::new(read_seq(reader)?),
      }
    },
    ID_MARK => RstKind::Mark(reader.read_ident()?),
    ID_DEF_TARGET => RstKind::DefTarget(reader.read_ident()?),
    ID_DIST => RstKind::Dist(reader.read_ident()?, reader.read_ident()?),
    ID_SEND => RstKind::Send(reader.read_ident()?, Rc::new(read_seq(reader)?)),
    ID_REPLACE => {
      let pattern = reader.read_string()?;
      let case_insensitive = reader.read_bool()?;
      let pattern = RantRegex::compile(pattern.as_str(), case_insensitive)
        .map_err(|_| ProgramLoadError::InvalidData("regex failed to compile"))?;
      RstKind::Replace(Rc::new(Replacer {
        pattern,
        subject: Rc::new(read_seq(reader)?),
        replacement: Rc::new(read_seq(reader)?),
      }))
    },
    ID_CHAR_GEN => {
      let class = CharClass::from_code(reader.read_u8()? as char)
        .ok_or(ProgramLoadError::InvalidData("character class out of range"))?;
      let count = reader.read_varint()? as u32;
      RstKind::CharGen { class, count }
    },
    other => return Err(ProgramLoadError::UnknownTypeId(other)),
  };

  Ok(Rst::new(span, kind))
}

fn write_query(out: &mut Vec<u8>, query: &Query) {
  write_string(out, query.table.as_str());
  match &query.subtype {
    Some(subtype) => {
      write_bool(out, true);
      write_string(out, subtype.as_str());
    },
    None => write_bool(out, false),
  }
  write_varint(out, query.class_filter.len() as u64);
  for rule in &query.class_filter {
    write_string(out, rule.class_name.as_str());
    write_bool(out, rule.include);
  }
  write_varint(out, query.regex_filters.len() as u64);
  for rule in &query.regex_filters {
    write_bool(out, rule.positive);
    write_string(out, rule.regex.pattern());
    write_bool(out, rule.regex.is_case_insensitive());
  }
  match &query.syllable_range {
    Some(range) => {
      write_bool(out, true);
      match range.min {
        Some(min) => {
          write_bool(out, true);
          write_varint(out, min as u64);
        },
        None => write_bool(out, false),
      }
      match range.max {
        Some(max) => {
          write_bool(out, true);
          write_varint(out, max as u64);
        },
        None => write_bool(out, false),
      }
    },
    None => write_bool(out, false),
  }
  write_bool(out, query.exclusive);
  match &query.carrier {
    Some(carrier) => {
      write_bool(out, true);
      out.push(carrier.kind as u8);
      write_string(out, carrier.id.as_str());
    },
    None => write_bool(out, false),
  }
}

fn read_query(reader: &mut ByteReader) -> LoadResult<Query> {
  let table = reader.read_ident()?;
  let mut query = Query::of(table);
  if reader.read_bool()? {
    query.subtype = Some(reader.read_ident()?);
  }
  let class_count = reader.read_len()?;
  for _ in 0..class_count {
    let class_name = reader.read_ident()?;
    let include = reader.read_bool()?;
    query.class_filter.push(ClassFilterRule { class_name, include });
  }
  let regex_count = reader.read_len()?;
  for _ in 0..regex_count {
    let positive = reader.read_bool()?;
    let pattern = reader.read_string()?;
    let case_insensitive = reader.read_bool()?;
    let regex = RantRegex::compile(pattern.as_str(), case_insensitive)
      .map_err(|_| ProgramLoadError::InvalidData("regex failed to compile"))?;
    query.regex_filters.push(RegexFilterRule { positive, regex });
  }
  if reader.read_bool()? {
    let min = if reader.read_bool()? { Some(reader.read_len()?) } else { None };
    let max = if reader.read_bool()? { Some(reader.read_len()?) } else { None };
    query.syllable_range = Some(SyllableRange { min, max });
  }
  query.exclusive = reader.read_bool()?;
  if reader.read_bool()? {
    let kind = match reader.read_u8()? {
      0 => CarrierKind::Match,
      1 => CarrierKind::Unique,
      _ => return Err(ProgramLoadError::InvalidData("carrier kind out of range")),
    };
    let id = reader.read_ident()?;
    query.carrier = Some(Carrier { id, kind });
  }
  Ok(query)
}
