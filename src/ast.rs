#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NoneLit,
    BoolLit(bool),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    ListLit(Vec<Expr>),
    Var(String),
    Attribute(Box<Expr>, String), // foo.bar
    Index(Box<Expr>, Box<Expr>),  // foo['bar'], foo[0]
    Call(String, Vec<Expr>),      // range(3)
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

/// A parsed `for="<target> in <iterable>"` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ForSpec {
    pub target: String,
    pub iterable: Expr,
}

/// A piece of text with `#{...}` markers split out.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece<'a> {
    Literal(&'a str),
    /// Raw source of the expression between `#{` and `}`.
    Expr(&'a str),
}
