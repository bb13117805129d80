use blaze_ast::{NodeId, NodeKind};

/// Fatal emission errors. The emitter never partially succeeds: any of
/// these aborts the session and no output is produced.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("node {0:?}: index out of range")]
    BadNode(NodeId),

    #[error("node {node:?}: {kind:?} not allowed {context}")]
    BadNodeKind {
        node: NodeId,
        kind: NodeKind,
        context: &'static str,
    },

    #[error("node {0:?}: malformed string reference")]
    BadString(NodeId),

    #[error("undefined identifier `{0}`")]
    Undefined(String),

    #[error("duplicate declaration of `{0}` in scope")]
    Duplicate(String),

    #[error("`{name}` called with {got} arguments, expected {expected}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("`{name}` is a {kind}, not usable here")]
    WrongSymbolKind { name: String, kind: &'static str },

    #[error("call argument count {0} exceeds the register convention")]
    TooManyArgs(usize),

    #[error("jump outside of a loop")]
    JumpOutsideLoop,

    #[error("temporal index outside the time axis")]
    TemporalIndexMisplaced,

    #[error("array `{0}` exceeds addressable size")]
    ArrayTooLarge(String),

    #[error("code buffer allocation failed: {0}")]
    Capacity(#[from] std::io::Error),

    #[error("label {0} bound twice")]
    LabelRebound(u32),

    #[error("unresolved patch at offset {site:#x} (label {label})")]
    UnresolvedPatch { site: usize, label: u32 },

    #[error("patch at offset {site:#x} out of displacement range")]
    PatchRange { site: usize },

    #[error("emission after finalize")]
    Finalized,
}
