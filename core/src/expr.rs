//! The expression and statement model shared by both lifters.
//!
//! Expressions are immutable nodes allocated in a per-task arena; child
//! links are arena references, so a whole method body is freed as a unit
//! when the task's arena drops. Statements are ordinary owned values that
//! point into the arena.

use bumpalo::Bump;

pub type ExprRef<'a> = &'a Expr<'a>;

/// Arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl BinOp {
    pub fn token(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// Relations used by conditional statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl RelOp {
    pub fn token(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Ge => ">=",
            RelOp::Gt => ">",
            RelOp::Le => "<=",
        }
    }

    pub fn negate(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Ge => RelOp::Lt,
            RelOp::Gt => RelOp::Le,
            RelOp::Le => RelOp::Gt,
        }
    }
}

/// NaN bias of the three-way compares (`cmpl` yields -1 on NaN, `cmpg` 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpBias {
    Less,
    Greater,
    /// cmp-long; NaN impossible.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeTarget {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

/// An expression node. `&'a str` payloads are pretty-printed Java types and
/// names interned in the same arena.
#[derive(Debug)]
pub enum Expr<'a> {
    Null,
    /// int-family literal (boolean, byte, short, char included).
    Int(i64),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(&'a str),
    /// `Foo.class`
    ClassLit(&'a str),
    /// register-named local `vN`
    Local(u16),
    /// parameter `pN`
    Param(u16),
    This,
    /// exception variable of catch handler N
    Caught(u16),
    FieldGet {
        /// `None` for static access; the class then qualifies the name.
        object: Option<ExprRef<'a>>,
        class: &'a str,
        name: &'a str,
        ty: &'a str,
    },
    ArrayGet {
        array: ExprRef<'a>,
        index: ExprRef<'a>,
    },
    ArrayLength(ExprRef<'a>),
    Invoke {
        target: InvokeTarget,
        object: Option<ExprRef<'a>>,
        class: &'a str,
        name: &'a str,
        args: &'a [ExprRef<'a>],
        ret: &'a str,
    },
    Binary {
        op: BinOp,
        wide: bool,
        lhs: ExprRef<'a>,
        rhs: ExprRef<'a>,
    },
    Unary {
        op: UnOp,
        operand: ExprRef<'a>,
    },
    Rel {
        op: RelOp,
        lhs: ExprRef<'a>,
        rhs: ExprRef<'a>,
    },
    Cmp {
        bias: CmpBias,
        lhs: ExprRef<'a>,
        rhs: ExprRef<'a>,
    },
    Cast {
        ty: &'a str,
        operand: ExprRef<'a>,
    },
    InstanceOf {
        ty: &'a str,
        operand: ExprRef<'a>,
    },
    /// `new-instance` before its constructor call is fused.
    NewInstance {
        ty: &'a str,
    },
    /// fused `new Foo(args)`
    NewObject {
        ty: &'a str,
        args: &'a [ExprRef<'a>],
    },
    NewArray {
        ty: &'a str,
        size: ExprRef<'a>,
    },
    ArrayInit {
        ty: &'a str,
        values: &'a [ExprRef<'a>],
    },
}

impl<'a> Expr<'a> {
    /// Rough Java type of this expression, used for local declarations.
    pub fn java_type(&self) -> &'a str {
        match self {
            Expr::Null => "Object",
            Expr::Int(_) => "int",
            Expr::Long(_) => "long",
            Expr::Float(_) => "float",
            Expr::Double(_) => "double",
            Expr::Str(_) => "String",
            Expr::ClassLit(_) => "Class",
            Expr::Local(_) | Expr::Param(_) | Expr::This | Expr::Caught(_) => "Object",
            Expr::FieldGet { ty, .. } => ty,
            Expr::ArrayGet { array, .. } => {
                let element = array.java_type();
                element.strip_suffix("[]").unwrap_or("Object")
            }
            Expr::ArrayLength(_) => "int",
            Expr::Invoke { ret, .. } => ret,
            Expr::Binary { wide, lhs, .. } => {
                if *wide {
                    "long"
                } else {
                    lhs.java_type()
                }
            }
            Expr::Unary { operand, .. } => operand.java_type(),
            Expr::Rel { .. } | Expr::InstanceOf { .. } => "boolean",
            Expr::Cmp { .. } => "int",
            Expr::Cast { ty, .. } => ty,
            Expr::NewInstance { ty } | Expr::NewObject { ty, .. } => ty,
            Expr::NewArray { ty, .. } | Expr::ArrayInit { ty, .. } => ty,
        }
    }

    /// True when evaluating the expression twice has no observable effect.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Expr::Null
                | Expr::Int(_)
                | Expr::Long(_)
                | Expr::Float(_)
                | Expr::Double(_)
                | Expr::Str(_)
                | Expr::ClassLit(_)
                | Expr::Local(_)
                | Expr::Param(_)
                | Expr::This
                | Expr::Caught(_)
        )
    }
}

/// One catch arm of a reconstructed try block.
#[derive(Debug, Clone)]
pub struct Catch<'a> {
    /// Pretty exception type, or `None` for the catch-all arm.
    pub ty: Option<String>,
    /// index of the exception variable (`eN`)
    pub var: u16,
    pub body: Vec<Stmt<'a>>,
}

/// A structured statement. Blocks own their child statement lists.
#[derive(Debug, Clone)]
pub enum Stmt<'a> {
    Expr(ExprRef<'a>),
    Assign {
        target: ExprRef<'a>,
        value: ExprRef<'a>,
    },
    Return(Option<ExprRef<'a>>),
    Throw(ExprRef<'a>),
    If {
        cond: ExprRef<'a>,
        then_body: Vec<Stmt<'a>>,
        else_body: Vec<Stmt<'a>>,
    },
    While {
        cond: ExprRef<'a>,
        body: Vec<Stmt<'a>>,
    },
    DoWhile {
        body: Vec<Stmt<'a>>,
        cond: ExprRef<'a>,
    },
    Switch {
        scrutinee: ExprRef<'a>,
        cases: Vec<(Vec<i32>, Vec<Stmt<'a>>)>,
        default: Vec<Stmt<'a>>,
    },
    TryCatch {
        body: Vec<Stmt<'a>>,
        catches: Vec<Catch<'a>>,
    },
    Synchronized {
        monitor: ExprRef<'a>,
        body: Vec<Stmt<'a>>,
    },
    MonitorEnter(ExprRef<'a>),
    MonitorExit(ExprRef<'a>),
    /// synthetic label, named from the byte offset
    Label(usize),
    Goto(usize),
    Break,
    Continue,
    Comment(String),
}

/// Shallow structural equality for the expressions the monitor pairing
/// compares: locals, parameters, `this` and caught exceptions.
pub fn same_place(a: &Expr<'_>, b: &Expr<'_>) -> bool {
    match (a, b) {
        (Expr::Local(x), Expr::Local(y)) => x == y,
        (Expr::Param(x), Expr::Param(y)) => x == y,
        (Expr::Caught(x), Expr::Caught(y)) => x == y,
        (Expr::This, Expr::This) => true,
        _ => false,
    }
}

/// Fold integer arithmetic on two literals and collapse the identity
/// forms; everything else allocates a binary node.
pub fn fold_binary<'a>(
    arena: &'a Bump,
    op: BinOp,
    wide: bool,
    lhs: ExprRef<'a>,
    rhs: ExprRef<'a>,
) -> ExprRef<'a> {
    if let (Expr::Int(a), Expr::Int(b)) = (lhs, rhs) {
        if let Some(value) = fold_int(op, *a as i32, *b as i32) {
            return arena.alloc(Expr::Int(i64::from(value)));
        }
    }
    if let (Expr::Long(a), Expr::Long(b)) = (lhs, rhs) {
        if let Some(value) = fold_long(op, *a, *b) {
            return arena.alloc(Expr::Long(value));
        }
    }

    // x + 0, x - 0, x * 1, x | 0, x & -1, x ^ 0, x << 0 keep x
    if let Some(identity) = int_literal(rhs) {
        let collapses = match op {
            BinOp::Add | BinOp::Sub | BinOp::Or | BinOp::Xor => identity == 0,
            BinOp::Shl | BinOp::Shr | BinOp::Ushr => identity == 0,
            BinOp::Mul | BinOp::Div => identity == 1,
            BinOp::And => identity == -1,
            BinOp::Rem => false,
        };
        if collapses {
            return lhs;
        }
    }
    // the commutative mirrors: 0 + x, 1 * x, 0 | x, -1 & x
    if let Some(identity) = int_literal(lhs) {
        let collapses = match op {
            BinOp::Add | BinOp::Or | BinOp::Xor => identity == 0,
            BinOp::Mul => identity == 1,
            BinOp::And => identity == -1,
            _ => false,
        };
        if collapses {
            return rhs;
        }
    }

    arena.alloc(Expr::Binary { op, wide, lhs, rhs })
}

fn int_literal(expr: &Expr<'_>) -> Option<i64> {
    match expr {
        Expr::Int(v) | Expr::Long(v) => Some(*v),
        _ => None,
    }
}

/// Two's-complement 32-bit fold; division by zero never folds.
fn fold_int(op: BinOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinOp::Rem => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32 & 31),
        BinOp::Shr => a.wrapping_shr(b as u32 & 31),
        BinOp::Ushr => ((a as u32).wrapping_shr(b as u32 & 31)) as i32,
    })
}

fn fold_long(op: BinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinOp::Rem => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32 & 63),
        BinOp::Shr => a.wrapping_shr(b as u32 & 63),
        BinOp::Ushr => ((a as u64).wrapping_shr(b as u32 & 63)) as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_fold() {
        let arena = Bump::new();
        let two = arena.alloc(Expr::Int(2));
        let three = arena.alloc(Expr::Int(3));
        let folded = fold_binary(&arena, BinOp::Mul, false, two, three);
        assert!(matches!(folded, Expr::Int(6)));
    }

    #[test]
    fn wrapping_matches_jvm_semantics() {
        let arena = Bump::new();
        let max = arena.alloc(Expr::Int(i64::from(i32::MAX)));
        let one = arena.alloc(Expr::Int(1));
        let folded = fold_binary(&arena, BinOp::Add, false, max, one);
        assert!(matches!(folded, Expr::Int(v) if *v == i64::from(i32::MIN)));
    }

    #[test]
    fn identities_collapse() {
        let arena = Bump::new();
        let local = arena.alloc(Expr::Local(3));
        let zero = arena.alloc(Expr::Int(0));
        let one = arena.alloc(Expr::Int(1));
        let minus_one = arena.alloc(Expr::Int(-1));

        assert!(matches!(
            fold_binary(&arena, BinOp::Add, false, local, zero),
            Expr::Local(3)
        ));
        assert!(matches!(
            fold_binary(&arena, BinOp::Mul, false, local, one),
            Expr::Local(3)
        ));
        assert!(matches!(
            fold_binary(&arena, BinOp::Or, false, local, zero),
            Expr::Local(3)
        ));
        assert!(matches!(
            fold_binary(&arena, BinOp::And, false, local, minus_one),
            Expr::Local(3)
        ));
    }

    #[test]
    fn division_by_zero_never_folds() {
        let arena = Bump::new();
        let one = arena.alloc(Expr::Int(1));
        let zero = arena.alloc(Expr::Int(0));
        let expr = fold_binary(&arena, BinOp::Div, false, one, zero);
        assert!(matches!(expr, Expr::Binary { op: BinOp::Div, .. }));
    }

    #[test]
    fn relation_negation_is_involutive() {
        for op in [RelOp::Eq, RelOp::Ne, RelOp::Lt, RelOp::Ge, RelOp::Gt, RelOp::Le] {
            assert_eq!(op.negate().negate(), op);
        }
    }
}
