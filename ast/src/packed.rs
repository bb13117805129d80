//! Packed AST codec (.blzast format).
//!
//! The interchange form is a flat pool of fixed-size 32-byte records plus
//! the raw string pool. Children are 16-bit indices; 0xFFFF means "none".
//! Record layout (little-endian):
//!
//! ```text
//! HEADER: magic[4] + version u16 + root u16 + node_count u32 + strpool_len u32
//! RECORD: kind u16 + c[5] u16 + pad u32 + imm0 u64 + imm1 u64
//! STRINGS: strpool_len raw bytes
//! ```
//!
//! Variable-length lists (program/action bodies, function params) are
//! chained through each member's `c[4]` slot; `Array4Access` is the one
//! kind that uses all five slots itself, and it only ever appears in
//! expression position. Packed call sites carry at most four arguments
//! (`c[0]..c[3]`, NONE-terminated).

use std::io::{self, Read, Write};

use crate::node::{
    BinOpKind, CollisionStrategy, FlowCtlOp, JumpKind, Node, TimeDir,
};
use crate::pool::{Ast, NodeId, StrRef};

const MAGIC: &[u8; 4] = b"BLZA";
const VERSION: u16 = 1;

/// Packed "no child" sentinel. Only meaningful in this codec; in memory
/// an absent child is `Option<NodeId>`.
pub const NONE: u16 = 0xFFFF;

const RECORD_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version {0}")]
    Version(u16),
    #[error("record {index}: unknown node kind {kind}")]
    UnknownKind { index: u16, kind: u16 },
    #[error("record {index}: child index {child} out of range")]
    BadIndex { index: u16, child: u16 },
    #[error("record {index}: string reference out of range")]
    BadString { index: u16 },
    #[error("record {index}: sibling chain does not terminate")]
    UnterminatedChain { index: u16 },
    #[error("root index {0} out of range")]
    BadRoot(u16),
    #[error("node count {0} exceeds the 16-bit index space")]
    TooManyNodes(u32),
}

// Kind tags in the packed form.
mod tag {
    pub const PROGRAM: u16 = 0;
    pub const VAR_DEF: u16 = 1;
    pub const FUNC_DEF: u16 = 2;
    pub const ACTION: u16 = 3;
    pub const BIN_OP: u16 = 4;
    pub const NUM: u16 = 5;
    pub const FLOAT_NUM: u16 = 6;
    pub const STR: u16 = 7;
    pub const IDENT: u16 = 8;
    pub const ASSIGN: u16 = 9;
    pub const ARRAY4_DEF: u16 = 10;
    pub const ARRAY4_ACCESS: u16 = 11;
    pub const TIMING: u16 = 12;
    pub const IF: u16 = 13;
    pub const LOOP: u16 = 14;
    pub const JUMP: u16 = 15;
    pub const CALL: u16 = 16;
    pub const RETURN: u16 = 17;
    pub const PRINT: u16 = 18;
    pub const FIXED_POINT: u16 = 19;
    pub const ARRIVE: u16 = 20;
    pub const TIMELINE: u16 = 21;
    pub const FLOW_SPEC: u16 = 22;
    pub const FLOW_CTL: u16 = 23;
    pub const COLLIDE: u16 = 24;
}

#[derive(Debug, Clone, Copy)]
struct Record {
    kind: u16,
    c: [u16; 5],
    imm0: u64,
    imm1: u64,
}

fn pack_str(r: StrRef) -> u64 {
    (r.offset as u64) | ((r.len as u64) << 32)
}

fn unpack_str(v: u64) -> StrRef {
    StrRef {
        offset: v as u32,
        len: (v >> 32) as u32,
    }
}

// -- Decoding --

fn read_exact<const N: usize>(r: &mut impl Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn record_from_bytes(b: &[u8; RECORD_SIZE]) -> Record {
    let u16_at = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
    let u64_at = |i: usize| {
        u64::from_le_bytes([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ])
    };
    Record {
        kind: u16_at(0),
        c: [u16_at(2), u16_at(4), u16_at(6), u16_at(8), u16_at(10)],
        imm0: u64_at(16),
        imm1: u64_at(24),
    }
}

struct Decoder {
    records: Vec<Record>,
    strpool_len: u32,
}

impl Decoder {
    fn child(&self, index: u16, child: u16) -> Result<NodeId, DecodeError> {
        if child == NONE || child as usize >= self.records.len() {
            return Err(DecodeError::BadIndex { index, child });
        }
        Ok(NodeId(child))
    }

    fn opt_child(&self, index: u16, child: u16) -> Result<Option<NodeId>, DecodeError> {
        if child == NONE {
            return Ok(None);
        }
        self.child(index, child).map(Some)
    }

    fn strref(&self, index: u16, v: u64) -> Result<StrRef, DecodeError> {
        let r = unpack_str(v);
        let end = r.offset.checked_add(r.len);
        match end {
            Some(end) if end <= self.strpool_len => Ok(r),
            _ => Err(DecodeError::BadString { index }),
        }
    }

    /// Walk a `c[4]`-linked sibling chain starting at `first`.
    fn chain(&self, index: u16, first: u16) -> Result<Vec<NodeId>, DecodeError> {
        let mut out = Vec::new();
        let mut cur = first;
        while cur != NONE {
            let id = self.child(index, cur)?;
            out.push(id);
            cur = self.records[id.index()].c[4];
            if out.len() > self.records.len() {
                return Err(DecodeError::UnterminatedChain { index });
            }
        }
        Ok(out)
    }

    /// NONE-terminated argument slots (`c[0]..c[3]`).
    fn arg_slots(&self, index: u16, rec: &Record) -> Result<Vec<NodeId>, DecodeError> {
        let mut out = Vec::new();
        for &slot in &rec.c[..4] {
            if slot == NONE {
                break;
            }
            out.push(self.child(index, slot)?);
        }
        Ok(out)
    }

    fn node(&self, index: u16) -> Result<Node, DecodeError> {
        let rec = self.records[index as usize];
        let node = match rec.kind {
            tag::PROGRAM => Node::Program {
                body: if rec.c[0] == NONE {
                    Vec::new()
                } else {
                    self.chain(index, rec.c[0])?
                },
            },
            tag::VAR_DEF => Node::VarDef {
                name: self.strref(index, rec.imm0)?,
                init: self.child(index, rec.c[0])?,
            },
            tag::FUNC_DEF => {
                let params = if rec.c[1] == NONE {
                    Vec::new()
                } else {
                    self.chain(index, rec.c[1])?
                        .into_iter()
                        .map(|id| match self.records[id.index()].kind {
                            tag::IDENT => {
                                self.strref(id.0, self.records[id.index()].imm0)
                            }
                            _ => Err(DecodeError::BadIndex {
                                index,
                                child: id.0,
                            }),
                        })
                        .collect::<Result<_, _>>()?
                };
                Node::FuncDef {
                    name: self.strref(index, rec.imm0)?,
                    params,
                    body: self.child(index, rec.c[0])?,
                }
            }
            tag::ACTION => Node::Action {
                stmts: if rec.c[0] == NONE {
                    Vec::new()
                } else {
                    self.chain(index, rec.c[0])?
                },
            },
            tag::BIN_OP => Node::BinOp {
                op: bin_op_from(rec.imm0)
                    .ok_or(DecodeError::UnknownKind { index, kind: rec.kind })?,
                lhs: self.child(index, rec.c[0])?,
                rhs: self.child(index, rec.c[1])?,
            },
            tag::NUM => Node::Num {
                value: rec.imm0 as i64,
            },
            tag::FLOAT_NUM => Node::FloatNum {
                value: f64::from_bits(rec.imm0),
            },
            tag::STR => Node::Str {
                text: self.strref(index, rec.imm0)?,
            },
            tag::IDENT => Node::Ident {
                name: self.strref(index, rec.imm0)?,
            },
            tag::ASSIGN => Node::Assign {
                target: self.child(index, rec.c[0])?,
                value: self.child(index, rec.c[1])?,
            },
            tag::ARRAY4_DEF => {
                let d = rec.imm1;
                Node::Array4Def {
                    name: self.strref(index, rec.imm0)?,
                    dims: [
                        d & 0xFFFF,
                        (d >> 16) & 0xFFFF,
                        (d >> 32) & 0xFFFF,
                        (d >> 48) & 0xFFFF,
                    ],
                }
            }
            tag::ARRAY4_ACCESS => Node::Array4Access {
                array: self.child(index, rec.c[0])?,
                index: [
                    self.child(index, rec.c[1])?,
                    self.child(index, rec.c[2])?,
                    self.child(index, rec.c[3])?,
                    self.child(index, rec.c[4])?,
                ],
            },
            tag::TIMING => Node::Timing {
                dir: if rec.imm0 == 0 {
                    TimeDir::Past
                } else {
                    TimeDir::Future
                },
            },
            tag::IF => Node::If {
                cond: self.child(index, rec.c[0])?,
                then_blk: self.child(index, rec.c[1])?,
                else_blk: self.opt_child(index, rec.c[2])?,
            },
            tag::LOOP => Node::Loop {
                cond: self.child(index, rec.c[0])?,
                body: self.child(index, rec.c[1])?,
            },
            tag::JUMP => Node::Jump {
                kind: if rec.imm0 == 0 {
                    JumpKind::Break
                } else {
                    JumpKind::Continue
                },
            },
            tag::CALL => Node::Call {
                callee: self.strref(index, rec.imm0)?,
                args: self.arg_slots(index, &rec)?,
            },
            tag::RETURN => Node::Return {
                value: self.opt_child(index, rec.c[0])?,
            },
            tag::PRINT => Node::Print {
                value: self.child(index, rec.c[0])?,
            },
            tag::FIXED_POINT => Node::FixedPoint {
                name: self.strref(index, rec.imm0)?,
                required: rec.imm1,
            },
            tag::ARRIVE => Node::Arrive {
                point: self.child(index, rec.c[0])?,
                timeline: self.child(index, rec.c[1])?,
                data: self.opt_child(index, rec.c[2])?,
            },
            tag::TIMELINE => Node::Timeline {
                name: self.strref(index, rec.imm0)?,
                id: self.child(index, rec.c[0])?,
                rate: self.opt_child(index, rec.c[1])?,
            },
            tag::FLOW_SPEC => Node::FlowSpec {
                flow: self.child(index, rec.c[0])?,
                body: self.child(index, rec.c[1])?,
            },
            tag::FLOW_CTL => Node::FlowCtl {
                op: match rec.imm0 {
                    0 => FlowCtlOp::Pause,
                    1 => FlowCtlOp::Resume,
                    _ => FlowCtlOp::Terminate,
                },
                flow: self.child(index, rec.c[0])?,
                rate: self.opt_child(index, rec.c[1])?,
            },
            tag::COLLIDE => Node::Collide {
                target: self.child(index, rec.c[0])?,
                strategy: match rec.imm0 {
                    0 => CollisionStrategy::Bounce,
                    1 => CollisionStrategy::Merge,
                    _ => CollisionStrategy::Queue,
                },
                fallback: self.opt_child(index, rec.c[1])?,
            },
            kind => return Err(DecodeError::UnknownKind { index, kind }),
        };
        Ok(node)
    }
}

fn bin_op_from(v: u64) -> Option<BinOpKind> {
    Some(match v {
        0 => BinOpKind::Add,
        1 => BinOpKind::Sub,
        2 => BinOpKind::Mul,
        3 => BinOpKind::Div,
        4 => BinOpKind::And,
        5 => BinOpKind::Or,
        6 => BinOpKind::Xor,
        7 => BinOpKind::Eq,
        8 => BinOpKind::Ne,
        9 => BinOpKind::Lt,
        10 => BinOpKind::Le,
        11 => BinOpKind::Gt,
        12 => BinOpKind::Ge,
        _ => return None,
    })
}

fn bin_op_to(op: BinOpKind) -> u64 {
    match op {
        BinOpKind::Add => 0,
        BinOpKind::Sub => 1,
        BinOpKind::Mul => 2,
        BinOpKind::Div => 3,
        BinOpKind::And => 4,
        BinOpKind::Or => 5,
        BinOpKind::Xor => 6,
        BinOpKind::Eq => 7,
        BinOpKind::Ne => 8,
        BinOpKind::Lt => 9,
        BinOpKind::Le => 10,
        BinOpKind::Gt => 11,
        BinOpKind::Ge => 12,
    }
}

/// Decode a packed AST.
pub fn decode(r: &mut impl Read) -> Result<Ast, DecodeError> {
    let magic: [u8; 4] = read_exact(r)?;
    if &magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = u16::from_le_bytes(read_exact::<2>(r)?);
    if version != VERSION {
        return Err(DecodeError::Version(version));
    }
    let root = u16::from_le_bytes(read_exact::<2>(r)?);
    let node_count = u32::from_le_bytes(read_exact::<4>(r)?);
    let strpool_len = u32::from_le_bytes(read_exact::<4>(r)?);
    if node_count >= NONE as u32 {
        return Err(DecodeError::TooManyNodes(node_count));
    }

    let mut records = Vec::with_capacity(node_count as usize);
    for _ in 0..node_count {
        let bytes: [u8; RECORD_SIZE] = read_exact(r)?;
        records.push(record_from_bytes(&bytes));
    }
    let mut strings = vec![0u8; strpool_len as usize];
    r.read_exact(&mut strings)?;

    let dec = Decoder {
        records,
        strpool_len,
    };

    let mut ast = Ast::new();
    ast.push_raw_strings(&strings);
    for i in 0..dec.records.len() {
        let node = dec.node(i as u16)?;
        ast.push(node);
    }
    if root as usize >= dec.records.len() {
        return Err(DecodeError::BadRoot(root));
    }
    ast.set_root(NodeId(root));
    Ok(ast)
}

// -- Encoding --

fn opt_raw(id: Option<NodeId>) -> u16 {
    id.map_or(NONE, |n| n.0)
}

/// Encode an AST into the packed form. List membership is materialized
/// into the members' `c[4]` slots, so a node may appear in at most one
/// list (true of trees built by [`crate::AstBuilder`]). Function
/// parameters get dedicated ident records appended after the node
/// records, chained from the function's `c[1]` slot the way the decoder
/// reads them back.
pub fn encode(ast: &Ast, w: &mut impl Write) -> io::Result<()> {
    // Sibling links for chained lists.
    let mut next = vec![NONE; ast.len()];
    for i in 0..ast.len() {
        let chain = match ast.node(NodeId(i as u16)).unwrap() {
            Node::Program { body } => Some(body),
            Node::Action { stmts } => Some(stmts),
            _ => None,
        };
        if let Some(items) = chain {
            for pair in items.windows(2) {
                next[pair[0].index()] = pair[1].0;
            }
        }
    }

    // Param ident records live past the real nodes; each function's
    // first param index goes into its c[1].
    let mut param_records: Vec<(StrRef, u16)> = Vec::new();
    let mut param_head = vec![NONE; ast.len()];
    for i in 0..ast.len() {
        if let Node::FuncDef { params, .. } = ast.node(NodeId(i as u16)).unwrap() {
            if params.is_empty() {
                continue;
            }
            let first = ast.len() + param_records.len();
            param_head[i] = first as u16;
            for (j, &p) in params.iter().enumerate() {
                let sibling = if j + 1 < params.len() {
                    (first + j + 1) as u16
                } else {
                    NONE
                };
                param_records.push((p, sibling));
            }
        }
    }
    let count = (ast.len() + param_records.len()) as u32;
    assert!(count < NONE as u32, "packed pool overflow");

    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&ast.root().map_or(NONE, |r| r.0).to_le_bytes())?;
    w.write_all(&count.to_le_bytes())?;
    w.write_all(&(ast.string_pool().len() as u32).to_le_bytes())?;

    for i in 0..ast.len() {
        let id = NodeId(i as u16);
        let mut c = [NONE; 5];
        let mut imm0 = 0u64;
        let mut imm1 = 0u64;
        let kind = match ast.node(id).unwrap() {
            Node::Program { body } => {
                c[0] = opt_raw(body.first().copied());
                tag::PROGRAM
            }
            Node::VarDef { name, init } => {
                imm0 = pack_str(*name);
                c[0] = init.0;
                tag::VAR_DEF
            }
            Node::FuncDef { name, body, .. } => {
                imm0 = pack_str(*name);
                c[0] = body.0;
                c[1] = param_head[i];
                tag::FUNC_DEF
            }
            Node::Action { stmts } => {
                c[0] = opt_raw(stmts.first().copied());
                tag::ACTION
            }
            Node::BinOp { op, lhs, rhs } => {
                imm0 = bin_op_to(*op);
                c[0] = lhs.0;
                c[1] = rhs.0;
                tag::BIN_OP
            }
            Node::Num { value } => {
                imm0 = *value as u64;
                tag::NUM
            }
            Node::FloatNum { value } => {
                imm0 = value.to_bits();
                tag::FLOAT_NUM
            }
            Node::Str { text } => {
                imm0 = pack_str(*text);
                tag::STR
            }
            Node::Ident { name } => {
                imm0 = pack_str(*name);
                tag::IDENT
            }
            Node::Assign { target, value } => {
                c[0] = target.0;
                c[1] = value.0;
                tag::ASSIGN
            }
            Node::Array4Def { name, dims } => {
                imm0 = pack_str(*name);
                imm1 = (dims[0] & 0xFFFF)
                    | ((dims[1] & 0xFFFF) << 16)
                    | ((dims[2] & 0xFFFF) << 32)
                    | ((dims[3] & 0xFFFF) << 48);
                tag::ARRAY4_DEF
            }
            Node::Array4Access { array, index } => {
                c[0] = array.0;
                for (slot, idx) in c[1..].iter_mut().zip(index) {
                    *slot = idx.0;
                }
                tag::ARRAY4_ACCESS
            }
            Node::Timing { dir } => {
                imm0 = matches!(dir, TimeDir::Future) as u64;
                tag::TIMING
            }
            Node::If {
                cond,
                then_blk,
                else_blk,
            } => {
                c[0] = cond.0;
                c[1] = then_blk.0;
                c[2] = opt_raw(*else_blk);
                tag::IF
            }
            Node::Loop { cond, body } => {
                c[0] = cond.0;
                c[1] = body.0;
                tag::LOOP
            }
            Node::Jump { kind } => {
                imm0 = matches!(kind, JumpKind::Continue) as u64;
                tag::JUMP
            }
            Node::Call { callee, args } => {
                imm0 = pack_str(*callee);
                for (slot, arg) in c[..4].iter_mut().zip(args) {
                    *slot = arg.0;
                }
                tag::CALL
            }
            Node::Return { value } => {
                c[0] = opt_raw(*value);
                tag::RETURN
            }
            Node::Print { value } => {
                c[0] = value.0;
                tag::PRINT
            }
            Node::FixedPoint { name, required } => {
                imm0 = pack_str(*name);
                imm1 = *required;
                tag::FIXED_POINT
            }
            Node::Arrive {
                point,
                timeline,
                data,
            } => {
                c[0] = point.0;
                c[1] = timeline.0;
                c[2] = opt_raw(*data);
                tag::ARRIVE
            }
            Node::Timeline { name, id, rate } => {
                imm0 = pack_str(*name);
                c[0] = id.0;
                c[1] = opt_raw(*rate);
                tag::TIMELINE
            }
            Node::FlowSpec { flow, body } => {
                c[0] = flow.0;
                c[1] = body.0;
                tag::FLOW_SPEC
            }
            Node::FlowCtl { op, flow, rate } => {
                imm0 = match op {
                    FlowCtlOp::Pause => 0,
                    FlowCtlOp::Resume => 1,
                    FlowCtlOp::Terminate => 2,
                };
                c[0] = flow.0;
                c[1] = opt_raw(*rate);
                tag::FLOW_CTL
            }
            Node::Collide {
                target,
                strategy,
                fallback,
            } => {
                imm0 = *strategy as u64;
                c[0] = target.0;
                c[1] = opt_raw(*fallback);
                tag::COLLIDE
            }
        };

        if c[4] == NONE {
            c[4] = next[i];
        }

        w.write_all(&kind.to_le_bytes())?;
        for slot in c {
            w.write_all(&slot.to_le_bytes())?;
        }
        w.write_all(&0u32.to_le_bytes())?;
        w.write_all(&imm0.to_le_bytes())?;
        w.write_all(&imm1.to_le_bytes())?;
    }

    for (name, sibling) in param_records {
        let mut c = [NONE; 5];
        c[4] = sibling;
        w.write_all(&tag::IDENT.to_le_bytes())?;
        for slot in c {
            w.write_all(&slot.to_le_bytes())?;
        }
        w.write_all(&0u32.to_le_bytes())?;
        w.write_all(&pack_str(name).to_le_bytes())?;
        w.write_all(&0u64.to_le_bytes())?;
    }

    w.write_all(ast.string_pool())?;
    Ok(())
}
