use crate::pool::{NodeId, StrRef};

/// Binary operators. Comparisons produce 0/1 in the integer path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOpKind {
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOpKind::Eq
                | BinOpKind::Ne
                | BinOpKind::Lt
                | BinOpKind::Le
                | BinOpKind::Gt
                | BinOpKind::Ge
        )
    }
}

/// Temporal index direction on a 4-D array's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDir {
    /// `<t`: one step into the past.
    Past,
    /// `>t`: one step into the future.
    Future,
}

/// Unstructured jump inside a loop body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Branch to the innermost loop's exit label.
    Break,
    /// Branch back to the innermost loop's top label.
    Continue,
}

/// Flow-control operations on a registered flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowCtlOp {
    Pause,
    Resume,
    Terminate,
}

/// Resolution strategy when a timeline collides with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionStrategy {
    Bounce = 0,
    Merge = 1,
    Queue = 2,
}

/// Kind tag of a node, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    VarDef,
    FuncDef,
    Action,
    BinOp,
    Num,
    FloatNum,
    Str,
    Ident,
    Assign,
    Array4Def,
    Array4Access,
    Timing,
    If,
    Loop,
    Jump,
    Call,
    Return,
    Print,
    FixedPoint,
    Arrive,
    Timeline,
    FlowSpec,
    FlowCtl,
    Collide,
}

/// An AST node: kind tag + per-kind payload.
///
/// Child links are `NodeId` / `Option<NodeId>`; variable-length child
/// lists are `Vec<NodeId>` (the packed form chains them through sibling
/// links, see [`crate::packed`]).
#[derive(Debug, Clone)]
pub enum Node {
    /// Top-level program: an ordered list of statements.
    Program { body: Vec<NodeId> },
    /// `name = init` introducing a scalar variable in the current scope.
    VarDef { name: StrRef, init: NodeId },
    /// Function definition; `body` is an `Action` block.
    FuncDef {
        name: StrRef,
        params: Vec<StrRef>,
        body: NodeId,
    },
    /// Action block: an ordered list of statements with its own scope.
    Action { stmts: Vec<NodeId> },
    BinOp {
        op: BinOpKind,
        lhs: NodeId,
        rhs: NodeId,
    },
    Num { value: i64 },
    FloatNum { value: f64 },
    /// String literal (embedded inline in the code stream).
    Str { text: StrRef },
    Ident { name: StrRef },
    /// `target = value`; target is an `Ident` or `Array4Access`.
    Assign { target: NodeId, value: NodeId },
    /// 4-D array definition with compile-time dimensions. Elements are
    /// 8 bytes wide.
    Array4Def { name: StrRef, dims: [u64; 4] },
    /// `array[x, y, z, t]`; each index is an expression, the temporal
    /// axis additionally accepts a `Timing` node.
    Array4Access {
        array: NodeId,
        index: [NodeId; 4],
    },
    /// Temporal index operator, valid only on the time axis of an
    /// `Array4Access`.
    Timing { dir: TimeDir },
    If {
        cond: NodeId,
        then_blk: NodeId,
        else_blk: Option<NodeId>,
    },
    /// `while cond: body`.
    Loop { cond: NodeId, body: NodeId },
    Jump { kind: JumpKind },
    Call {
        callee: StrRef,
        args: Vec<NodeId>,
    },
    Return { value: Option<NodeId> },
    /// Print a string literal (no newline) or a numeric expression
    /// (decimal + newline).
    Print { value: NodeId },
    /// Register a fixed point and bind its id to `name`.
    FixedPoint { name: StrRef, required: u64 },
    /// Arrive at a fixed point: `point` evaluates to the fixed-point id,
    /// `timeline` to the arriving timeline id.
    Arrive {
        point: NodeId,
        timeline: NodeId,
        data: Option<NodeId>,
    },
    /// Register a permanent (rate `None`) or rate-limited flow and bind
    /// its flow id to `name`.
    Timeline {
        name: StrRef,
        id: NodeId,
        rate: Option<NodeId>,
    },
    /// Gated block: body runs only when the flow's tick is due.
    FlowSpec { flow: NodeId, body: NodeId },
    FlowCtl {
        op: FlowCtlOp,
        flow: NodeId,
        rate: Option<NodeId>,
    },
    /// Collision statement: scan the collision table for `target` and
    /// resolve by `strategy`. `fallback` supplies the bounce target.
    Collide {
        target: NodeId,
        strategy: CollisionStrategy,
        fallback: Option<NodeId>,
    },
}

impl Node {
    pub const fn kind(&self) -> NodeKind {
        match self {
            Node::Program { .. } => NodeKind::Program,
            Node::VarDef { .. } => NodeKind::VarDef,
            Node::FuncDef { .. } => NodeKind::FuncDef,
            Node::Action { .. } => NodeKind::Action,
            Node::BinOp { .. } => NodeKind::BinOp,
            Node::Num { .. } => NodeKind::Num,
            Node::FloatNum { .. } => NodeKind::FloatNum,
            Node::Str { .. } => NodeKind::Str,
            Node::Ident { .. } => NodeKind::Ident,
            Node::Assign { .. } => NodeKind::Assign,
            Node::Array4Def { .. } => NodeKind::Array4Def,
            Node::Array4Access { .. } => NodeKind::Array4Access,
            Node::Timing { .. } => NodeKind::Timing,
            Node::If { .. } => NodeKind::If,
            Node::Loop { .. } => NodeKind::Loop,
            Node::Jump { .. } => NodeKind::Jump,
            Node::Call { .. } => NodeKind::Call,
            Node::Return { .. } => NodeKind::Return,
            Node::Print { .. } => NodeKind::Print,
            Node::FixedPoint { .. } => NodeKind::FixedPoint,
            Node::Arrive { .. } => NodeKind::Arrive,
            Node::Timeline { .. } => NodeKind::Timeline,
            Node::FlowSpec { .. } => NodeKind::FlowSpec,
            Node::FlowCtl { .. } => NodeKind::FlowCtl,
            Node::Collide { .. } => NodeKind::Collide,
        }
    }
}
