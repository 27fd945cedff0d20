use super::value::JsStr;
use std::sync::Arc;

pub type Ident = JsStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    VarDecl(VarDecl),
    Function(Arc<FunctionDef>),
    Class(Arc<ClassDef>),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        left: ForBinding,
        right: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        left: ForBinding,
        right: Expr,
        body: Box<Stmt>,
    },
    Break(Option<Ident>),
    Continue(Option<Ident>),
    Labeled {
        label: Ident,
        body: Box<Stmt>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Debugger,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub kind: DeclKind,
    pub declarations: Vec<Declarator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Decl(VarDecl),
    Expr(Expr),
}

/// Left side of `for…in` / `for…of`.
#[derive(Debug, Clone, PartialEq)]
pub enum ForBinding {
    Decl(DeclKind, Pattern),
    Target(Pattern),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

/// Binding and assignment targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(Ident),
    /// Property target; only produced for assignments, never declarations.
    Member(Box<Expr>),
    Object {
        props: Vec<PatternProp>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default {
        target: Box<Pattern>,
        default: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternProp {
    pub key: PropKey,
    pub value: Pattern,
}

impl Pattern {
    /// Names this pattern declares, in source order.
    pub fn bound_names(&self, out: &mut Vec<Ident>) {
        match self {
            Pattern::Ident(name) => out.push(name.clone()),
            Pattern::Member(_) => {}
            Pattern::Object { props, rest } => {
                for prop in props {
                    prop.value.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Array { elements, rest } => {
                for element in elements.iter().flatten() {
                    element.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Default { target, .. } => target.bound_names(out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    Getter,
    Setter,
    ClassConstructor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<Ident>,
    pub params: Vec<Pattern>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub kind: FunctionKind,
    pub strict: bool,
    /// `var` names declared anywhere in the body, hoisted at entry.
    pub var_names: Vec<Ident>,
    /// Parameters before the first default or rest, as `length` reports.
    pub length: usize,
    /// The body or parameters mention `arguments` outside nested functions.
    pub uses_arguments: bool,
}

impl FunctionDef {
    pub fn is_arrow(&self) -> bool {
        self.kind == FunctionKind::Arrow
    }

    /// Plain `function` definitions can be used with `new`.
    pub fn is_constructor(&self) -> bool {
        self.kind == FunctionKind::Normal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Concise arrow body: `() => expr`.
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: Option<Ident>,
    pub superclass: Option<Expr>,
    pub constructor: Option<Arc<FunctionDef>>,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub key: PropKey,
    pub is_static: bool,
    pub kind: ClassMemberKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMemberKind {
    Method(Arc<FunctionDef>),
    Getter(Arc<FunctionDef>),
    Setter(Arc<FunctionDef>),
    Field(Option<Arc<Expr>>),
    /// `static { … }`; the key is unused.
    StaticBlock(Arc<FunctionDef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParts {
    /// Cooked strings; `None` where an escape is invalid (tagged templates only).
    pub cooked: Vec<Option<JsStr>>,
    pub raw: Vec<JsStr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(JsStr),
    Template {
        quasis: Vec<JsStr>,
        exprs: Vec<Expr>,
    },
    TaggedTemplate {
        tag: Box<Expr>,
        parts: Arc<TemplateParts>,
        exprs: Vec<Expr>,
    },
    Regex {
        pattern: JsStr,
        flags: JsStr,
    },
    Bool(bool),
    Null,
    This,
    Ident(Ident),
    Array(Vec<ArrayElement>),
    Object(Vec<ObjectProp>),
    Function(Arc<FunctionDef>),
    Class(Arc<ClassDef>),
    Member {
        object: Box<Expr>,
        property: PropKey,
        optional: bool,
    },
    SuperMember {
        property: PropKey,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
        optional: bool,
    },
    SuperCall {
        args: Vec<Argument>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Argument>,
    },
    NewTarget,
    /// Outer edge of an `a?.b.c` chain; a short-circuit inside yields `undefined` here.
    OptionalChain(Box<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    Hole,
    Expr(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Expr(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProp {
    KeyValue(PropKey, Expr),
    Method(PropKey, Arc<FunctionDef>),
    Getter(PropKey, Arc<FunctionDef>),
    Setter(PropKey, Arc<FunctionDef>),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Static(JsStr),
    Computed(Box<Expr>),
    /// `#name`; stored as a non-enumerable `"#name"` key.
    Private(JsStr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Binary(BinaryOp),
    Logical(LogicalOp),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub var_names: Vec<Ident>,
    pub strict: bool,
}
