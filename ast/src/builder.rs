use crate::node::{
    BinOpKind, CollisionStrategy, FlowCtlOp, JumpKind, Node, TimeDir,
};
use crate::pool::{Ast, NodeId, StrRef};

/// Programmatic AST construction.
///
/// Thin convenience layer over [`Ast::push`]; each method appends one
/// node and returns its id. Front ends and tests build trees bottom-up:
///
/// ```
/// use blaze_ast::{AstBuilder, BinOpKind};
///
/// let mut b = AstBuilder::new();
/// let x = b.var_def("x", |b| b.num(41));
/// let p = {
///     let lhs = b.ident("x");
///     let rhs = b.num(1);
///     let sum = b.bin(BinOpKind::Add, lhs, rhs);
///     b.print(sum)
/// };
/// let ast = b.program(vec![x, p]);
/// assert!(ast.root().is_some());
/// ```
#[derive(Debug, Default)]
pub struct AstBuilder {
    ast: Ast,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StrRef {
        self.ast.intern(s)
    }

    // -- Expressions --

    pub fn num(&mut self, value: i64) -> NodeId {
        self.ast.push(Node::Num { value })
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        self.ast.push(Node::FloatNum { value })
    }

    pub fn str_lit(&mut self, text: &str) -> NodeId {
        let text = self.ast.intern(text);
        self.ast.push(Node::Str { text })
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        let name = self.ast.intern(name);
        self.ast.push(Node::Ident { name })
    }

    pub fn bin(&mut self, op: BinOpKind, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.ast.push(Node::BinOp { op, lhs, rhs })
    }

    pub fn timing(&mut self, dir: TimeDir) -> NodeId {
        self.ast.push(Node::Timing { dir })
    }

    pub fn array_access(&mut self, array: NodeId, index: [NodeId; 4]) -> NodeId {
        self.ast.push(Node::Array4Access { array, index })
    }

    pub fn call(&mut self, callee: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.ast.intern(callee);
        self.ast.push(Node::Call { callee, args })
    }

    // -- Statements --

    /// `name = init(builder)`. The initializer closure keeps the common
    /// case (literal initializers) to one call site line.
    pub fn var_def(
        &mut self,
        name: &str,
        init: impl FnOnce(&mut Self) -> NodeId,
    ) -> NodeId {
        let init = init(self);
        let name = self.ast.intern(name);
        self.ast.push(Node::VarDef { name, init })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.ast.push(Node::Assign { target, value })
    }

    pub fn action(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.ast.push(Node::Action { stmts })
    }

    pub fn func_def(&mut self, name: &str, params: &[&str], body: NodeId) -> NodeId {
        let name = self.ast.intern(name);
        let params = params.iter().map(|p| self.ast.intern(p)).collect();
        self.ast.push(Node::FuncDef { name, params, body })
    }

    pub fn if_stmt(
        &mut self,
        cond: NodeId,
        then_blk: NodeId,
        else_blk: Option<NodeId>,
    ) -> NodeId {
        self.ast.push(Node::If {
            cond,
            then_blk,
            else_blk,
        })
    }

    pub fn while_loop(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.ast.push(Node::Loop { cond, body })
    }

    pub fn jump(&mut self, kind: JumpKind) -> NodeId {
        self.ast.push(Node::Jump { kind })
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.ast.push(Node::Return { value })
    }

    pub fn print(&mut self, value: NodeId) -> NodeId {
        self.ast.push(Node::Print { value })
    }

    pub fn array4_def(&mut self, name: &str, dims: [u64; 4]) -> NodeId {
        let name = self.ast.intern(name);
        self.ast.push(Node::Array4Def { name, dims })
    }

    // -- Timeline statements --

    pub fn fixed_point(&mut self, name: &str, required: u64) -> NodeId {
        let name = self.ast.intern(name);
        self.ast.push(Node::FixedPoint { name, required })
    }

    pub fn arrive(
        &mut self,
        point: NodeId,
        timeline: NodeId,
        data: Option<NodeId>,
    ) -> NodeId {
        self.ast.push(Node::Arrive {
            point,
            timeline,
            data,
        })
    }

    pub fn timeline(&mut self, name: &str, id: NodeId, rate: Option<NodeId>) -> NodeId {
        let name = self.ast.intern(name);
        self.ast.push(Node::Timeline { name, id, rate })
    }

    pub fn flow_spec(&mut self, flow: NodeId, body: NodeId) -> NodeId {
        self.ast.push(Node::FlowSpec { flow, body })
    }

    pub fn flow_ctl(&mut self, op: FlowCtlOp, flow: NodeId, rate: Option<NodeId>) -> NodeId {
        self.ast.push(Node::FlowCtl { op, flow, rate })
    }

    pub fn collide(
        &mut self,
        target: NodeId,
        strategy: CollisionStrategy,
        fallback: Option<NodeId>,
    ) -> NodeId {
        self.ast.push(Node::Collide {
            target,
            strategy,
            fallback,
        })
    }

    /// Wrap the statements in a `Program` root and finish the AST.
    pub fn program(mut self, body: Vec<NodeId>) -> Ast {
        let root = self.ast.push(Node::Program { body });
        self.ast.set_root(root);
        self.ast
    }

    /// Finish without wrapping (root must already exist in the pool).
    pub fn finish(mut self, root: NodeId) -> Ast {
        self.ast.set_root(root);
        self.ast
    }
}
