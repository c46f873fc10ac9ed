//! Java source rendering: descriptor pretty-printing, expression and
//! statement text, and the per-class writers for both pipelines.
//!
//! Output is best-effort source: when control flow resists structuring the
//! writer keeps synthetic labels and `goto` lines rather than dropping
//! code.

use std::fmt::Write;

use ahash::AHashMap;
use bumpalo::Bump;
use declass_dex::class_data::{ClassData, CodeItem, EncodedValue};
use declass_dex::Dex;
use declass_jvm::ClassFile;
use log::{debug, warn};

use crate::errors::TaskError;
use crate::expr::{BinOp, CmpBias, Expr, ExprRef, InvokeTarget, RelOp, Stmt, UnOp};
use crate::lift::MethodBody;
use crate::source::{is_anonymous, simple_name, SourceTree};

const INDENT: &str = "    ";

/// Render a JVM type descriptor as Java source text. `java.lang` types
/// lose their package; everything else keeps the dotted qualified name.
pub fn pretty_type(descriptor: &str) -> String {
    if let Some(element) = descriptor.strip_prefix('[') {
        return format!("{}[]", pretty_type(element));
    }
    match descriptor {
        "V" => "void".to_owned(),
        "Z" => "boolean".to_owned(),
        "B" => "byte".to_owned(),
        "S" => "short".to_owned(),
        "C" => "char".to_owned(),
        "I" => "int".to_owned(),
        "J" => "long".to_owned(),
        "F" => "float".to_owned(),
        "D" => "double".to_owned(),
        _ => {
            let inner = descriptor
                .strip_prefix('L')
                .and_then(|d| d.strip_suffix(';'))
                .unwrap_or(descriptor);
            match inner.strip_prefix("java/lang/") {
                Some(rest) if !rest.contains('/') => rest.replace('$', "."),
                _ => inner.replace('/', ".").replace('$', "."),
            }
        }
    }
}

/// Split a method descriptor `(II)V` into pretty parameter types and the
/// pretty return type.
pub fn method_descriptor_parts(descriptor: &str) -> (Vec<String>, String) {
    let mut params = Vec::new();
    let bytes = descriptor.as_bytes();
    let mut pos = 1; // skip '('

    while pos < bytes.len() && bytes[pos] != b')' {
        let start = pos;
        while pos < bytes.len() && bytes[pos] == b'[' {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b'L' {
            while pos < bytes.len() && bytes[pos] != b';' {
                pos += 1;
            }
        }
        pos += 1;
        params.push(pretty_type(&descriptor[start..pos.min(descriptor.len())]));
    }
    let ret = if pos + 1 < descriptor.len() {
        pretty_type(&descriptor[pos + 1..])
    } else {
        "void".to_owned()
    };
    (params, ret)
}

fn is_primitive(ty: &str) -> bool {
    matches!(
        ty,
        "void" | "boolean" | "byte" | "short" | "char" | "int" | "long" | "float" | "double"
    )
}

/// Types visible to one method body, for null/boolean rendering decisions.
#[derive(Default)]
struct TypeEnv<'a> {
    locals: AHashMap<u16, &'a str>,
    params: Vec<String>,
}

impl<'a> TypeEnv<'a> {
    fn of_expr(&self, expr: &Expr<'_>) -> Option<String> {
        match expr {
            Expr::Local(reg) => self.locals.get(reg).map(|t| (*t).to_owned()),
            Expr::Param(i) => self.params.get(*i as usize).cloned(),
            Expr::FieldGet { ty, .. } | Expr::Cast { ty, .. } => Some((*ty).to_owned()),
            Expr::Invoke { ret, .. } => Some((*ret).to_owned()),
            Expr::Int(_) | Expr::ArrayLength(_) | Expr::Cmp { .. } => Some("int".to_owned()),
            Expr::Long(_) => Some("long".to_owned()),
            Expr::Float(_) => Some("float".to_owned()),
            Expr::Double(_) => Some("double".to_owned()),
            Expr::Rel { .. } | Expr::InstanceOf { .. } => Some("boolean".to_owned()),
            Expr::Null | Expr::Str(_) | Expr::This | Expr::Caught(_) => Some("Object".to_owned()),
            Expr::NewObject { ty, .. }
            | Expr::NewInstance { ty }
            | Expr::NewArray { ty, .. }
            | Expr::ArrayInit { ty, .. } => Some((*ty).to_owned()),
            Expr::Binary { wide, lhs, .. } => {
                if *wide {
                    Some("long".to_owned())
                } else {
                    self.of_expr(lhs)
                }
            }
            Expr::Unary { operand, .. } => self.of_expr(operand),
            _ => None,
        }
    }

    fn is_reference(&self, expr: &Expr<'_>) -> bool {
        match expr {
            Expr::Null
            | Expr::Str(_)
            | Expr::This
            | Expr::Caught(_)
            | Expr::ClassLit(_)
            | Expr::NewObject { .. }
            | Expr::NewInstance { .. }
            | Expr::NewArray { .. }
            | Expr::ArrayInit { .. } => true,
            other => self
                .of_expr(other)
                .map(|ty| !is_primitive(&ty) || ty.ends_with("[]"))
                .unwrap_or(false),
        }
    }

    fn is_boolean(&self, expr: &Expr<'_>) -> bool {
        self.of_expr(expr).as_deref() == Some("boolean")
    }
}

struct Writer<'e> {
    out: String,
    depth: usize,
    env: TypeEnv<'e>,
}

impl<'e> Writer<'e> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn expr(&self, expr: &Expr<'_>) -> String {
        match expr {
            Expr::Null => "null".to_owned(),
            Expr::Int(v) => format!("{v}"),
            Expr::Long(v) => format!("{v}L"),
            Expr::Float(v) => float_literal(*v),
            Expr::Double(v) => double_literal(*v),
            Expr::Str(s) => format!("\"{}\"", escape_str(s)),
            Expr::ClassLit(ty) => format!("{ty}.class"),
            Expr::Local(reg) => format!("v{reg}"),
            Expr::Param(i) => format!("p{i}"),
            Expr::This => "this".to_owned(),
            Expr::Caught(v) => format!("e{v}"),
            Expr::FieldGet {
                object,
                class,
                name,
                ..
            } => match object {
                Some(object) => format!("{}.{name}", self.operand(object)),
                None => format!("{class}.{name}"),
            },
            Expr::ArrayGet { array, index } => {
                format!("{}[{}]", self.operand(array), self.expr(index))
            }
            Expr::ArrayLength(array) => format!("{}.length", self.operand(array)),
            Expr::Invoke {
                target,
                object,
                class,
                name,
                args,
                ..
            } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                let receiver = match (target, object) {
                    (InvokeTarget::Super, _) => "super".to_owned(),
                    (InvokeTarget::Static, _) => (*class).to_owned(),
                    (_, Some(Expr::This)) => "this".to_owned(),
                    (_, Some(object)) => self.operand(object),
                    (_, None) => (*class).to_owned(),
                };
                format!("{receiver}.{name}({})", args.join(", "))
            }
            Expr::Binary { op, lhs, rhs, .. } => format!(
                "{} {} {}",
                self.operand(lhs),
                op.token(),
                self.operand(rhs)
            ),
            Expr::Unary { op, operand } => {
                let token = match op {
                    UnOp::Neg => "-",
                    UnOp::Not => "~",
                };
                format!("{token}{}", self.operand(operand))
            }
            Expr::Rel { op, lhs, rhs } => self.rel(*op, lhs, rhs),
            Expr::Cmp { bias, lhs, rhs } => {
                let helper = match bias {
                    CmpBias::None => "Long.compare",
                    CmpBias::Less | CmpBias::Greater => {
                        if self.env.of_expr(lhs).as_deref() == Some("double") {
                            "Double.compare"
                        } else {
                            "Float.compare"
                        }
                    }
                };
                format!("{helper}({}, {})", self.expr(lhs), self.expr(rhs))
            }
            Expr::Cast { ty, operand } => format!("({ty}) {}", self.operand(operand)),
            Expr::InstanceOf { ty, operand } => {
                format!("{} instanceof {ty}", self.operand(operand))
            }
            Expr::NewInstance { ty } => format!("new {ty}()"),
            Expr::NewObject { ty, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("new {ty}({})", args.join(", "))
            }
            Expr::NewArray { ty, size } => {
                // new int[5], new String[n][]
                match ty.split_once("[]") {
                    Some((element, rest)) => {
                        format!("new {element}[{}]{rest}", self.expr(size))
                    }
                    None => format!("new {ty}[{}]", self.expr(size)),
                }
            }
            Expr::ArrayInit { ty, values } => {
                let values: Vec<String> = values.iter().map(|v| self.expr(v)).collect();
                format!("new {ty} {{{}}}", values.join(", "))
            }
        }
    }

    /// Sub-expression text, parenthesized when composite.
    fn operand(&self, expr: &Expr<'_>) -> String {
        let text = self.expr(expr);
        let composite = matches!(
            expr,
            Expr::Binary { .. }
                | Expr::Rel { .. }
                | Expr::Unary { .. }
                | Expr::Cast { .. }
                | Expr::InstanceOf { .. }
                | Expr::Cmp { .. }
        );
        if composite {
            format!("({text})")
        } else {
            text
        }
    }

    fn rel(&self, op: RelOp, lhs: &Expr<'_>, rhs: &Expr<'_>) -> String {
        // a three-way compare feeding a zero test collapses to the direct
        // comparison
        if let (Expr::Cmp { lhs: a, rhs: b, .. }, Expr::Int(0)) = (lhs, rhs) {
            return format!("{} {} {}", self.operand(a), op.token(), self.operand(b));
        }
        if let Expr::Int(0) = rhs {
            if self.env.is_reference(lhs) {
                return format!("{} {} null", self.operand(lhs), op.token());
            }
            if self.env.is_boolean(lhs) {
                return match op {
                    RelOp::Eq => format!("!{}", self.operand(lhs)),
                    RelOp::Ne => self.expr(lhs),
                    _ => format!("{} {} 0", self.operand(lhs), op.token()),
                };
            }
        }
        format!("{} {} {}", self.operand(lhs), op.token(), self.operand(rhs))
    }

    fn stmt(&mut self, stmt: &Stmt<'_>) {
        match stmt {
            Stmt::Expr(expr) => {
                let text = self.expr(expr);
                self.line(&format!("{text};"));
            }
            Stmt::Assign { target, value } => {
                let text = format!("{} = {};", self.expr(target), self.expr(value));
                self.line(&text);
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(value)) => {
                let text = format!("return {};", self.expr(value));
                self.line(&text);
            }
            Stmt::Throw(value) => {
                let text = format!("throw {};", self.expr(value));
                self.line(&text);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let text = format!("if ({}) {{", self.expr(cond));
                self.line(&text);
                self.block(then_body);
                if else_body.is_empty() {
                    self.line("}");
                } else {
                    self.line("} else {");
                    self.block(else_body);
                    self.line("}");
                }
            }
            Stmt::While { cond, body } => {
                let head = if matches!(cond, Expr::Int(v) if *v != 0) {
                    "while (true) {".to_owned()
                } else {
                    format!("while ({}) {{", self.expr(cond))
                };
                self.line(&head);
                self.block(body);
                self.line("}");
            }
            Stmt::DoWhile { body, cond } => {
                self.line("do {");
                self.block(body);
                let tail = format!("}} while ({});", self.expr(cond));
                self.line(&tail);
            }
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let head = format!("switch ({}) {{", self.expr(scrutinee));
                self.line(&head);
                for (keys, body) in cases {
                    for key in keys {
                        self.line(&format!("case {key}:"));
                    }
                    self.block(body);
                }
                if !default.is_empty() {
                    self.line("default:");
                    self.block(default);
                }
                self.line("}");
            }
            Stmt::TryCatch { body, catches } => {
                self.line("try {");
                self.block(body);
                for catch in catches {
                    let ty = catch.ty.as_deref().unwrap_or("Throwable");
                    let head = format!("}} catch ({ty} e{}) {{", catch.var);
                    self.line(&head);
                    self.block(&catch.body);
                }
                self.line("}");
            }
            Stmt::Synchronized { monitor, body } => {
                let head = format!("synchronized ({}) {{", self.expr(monitor));
                self.line(&head);
                self.block(body);
                self.line("}");
            }
            Stmt::MonitorEnter(expr) => {
                let text = format!("// monitor-enter {}", self.expr(expr));
                self.line(&text);
            }
            Stmt::MonitorExit(expr) => {
                let text = format!("// monitor-exit {}", self.expr(expr));
                self.line(&text);
            }
            Stmt::Label(offset) => self.line(&format!("label_{offset:04x}:")),
            Stmt::Goto(offset) => self.line(&format!("goto label_{offset:04x};")),
            Stmt::Break => self.line("break;"),
            Stmt::Continue => self.line("continue;"),
            Stmt::Comment(text) => self.line(&format!("// {text}")),
        }
    }

    fn block(&mut self, stmts: &[Stmt<'_>]) {
        self.depth += 1;
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.depth -= 1;
    }
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

fn float_literal(v: f32) -> String {
    if v.is_nan() {
        "Float.NaN".to_owned()
    } else if v == f32::INFINITY {
        "Float.POSITIVE_INFINITY".to_owned()
    } else if v == f32::NEG_INFINITY {
        "Float.NEGATIVE_INFINITY".to_owned()
    } else {
        format!("{v:?}f")
    }
}

fn double_literal(v: f64) -> String {
    if v.is_nan() {
        "Double.NaN".to_owned()
    } else if v == f64::INFINITY {
        "Double.POSITIVE_INFINITY".to_owned()
    } else if v == f64::NEG_INFINITY {
        "Double.NEGATIVE_INFINITY".to_owned()
    } else {
        format!("{v:?}")
    }
}

/// Does the body reduce to nothing once an empty `return` is elided?
fn elidable(stmts: &[Stmt<'_>]) -> bool {
    match stmts {
        [] => true,
        [Stmt::Return(None)] => true,
        _ => false,
    }
}

/// Render one top-level class (and its nested classes) from a DEX image.
pub fn write_dex_class(
    dex: &Dex,
    tree: &SourceTree,
    node_id: usize,
    arena: &Bump,
) -> Result<String, TaskError> {
    let class = &dex.class_defs[tree.nodes[node_id].class_index];
    let descriptor = class.descriptor(dex)?;

    let mut out = String::new();
    let package = crate::source::package_path(&descriptor).replace('/', ".");
    if !package.is_empty() {
        let _ = writeln!(out, "package {package};\n");
    }
    dex_class_body(dex, tree, node_id, arena, 0, &mut out)?;
    Ok(out)
}

fn dex_class_body(
    dex: &Dex,
    tree: &SourceTree,
    node_id: usize,
    arena: &Bump,
    depth: usize,
    out: &mut String,
) -> Result<(), TaskError> {
    let node = &tree.nodes[node_id];
    let class = &dex.class_defs[node.class_index];
    let descriptor = class.descriptor(dex)?;
    let simple = simple_name(&descriptor);
    let tail = simple.rsplit('$').next().unwrap_or(simple);
    // an anonymous class's numeric tail is not a legal name
    let display_name = if is_anonymous(&descriptor) {
        format!("Anonymous{tail}")
    } else {
        tail.to_owned()
    };
    let display_name = display_name.as_str();
    let data = ClassData::decode(dex, class)?;

    let pad = INDENT.repeat(depth);
    let flags = class.access_flags;
    let kind = if flags.is_annotation() {
        "@interface"
    } else if flags.is_interface() {
        "interface"
    } else if flags.is_enum() {
        "enum"
    } else {
        "class"
    };
    let mut header = String::new();
    let modifiers = flags.java_modifiers(false);
    if !modifiers.is_empty() {
        let _ = write!(header, "{modifiers} ");
    }
    let _ = write!(header, "{kind} {display_name}");
    if let Some(superclass) = class.superclass(dex)? {
        let pretty = pretty_type(&superclass);
        if pretty != "Object" && !flags.is_interface() && !flags.is_enum() {
            let _ = write!(header, " extends {pretty}");
        }
    }
    let interfaces = class.interfaces(dex)?;
    if !interfaces.is_empty() {
        let names: Vec<String> = interfaces
            .iter()
            .map(|idx| {
                dex.type_descriptor(u32::from(*idx))
                    .map(|d| pretty_type(&d))
            })
            .collect::<Result<_, _>>()?;
        let keyword = if flags.is_interface() {
            "extends"
        } else {
            "implements"
        };
        let _ = write!(header, " {keyword} {}", names.join(", "));
    }
    let _ = writeln!(out, "{pad}{header} {{");

    // static fields carry their encoded initial values in declaration order
    let initializers = EncodedValue::decode_array(dex, class.static_values_off)?;
    for (index, field) in data.static_fields.iter().enumerate() {
        let item = dex.field(field.field_idx)?;
        let ty = pretty_type(&item.type_descriptor(dex)?);
        let modifiers = field.access_flags.java_modifiers(false);
        let prefix = if modifiers.is_empty() {
            String::new()
        } else {
            format!("{modifiers} ")
        };
        match initializers.get(index) {
            Some(value) => {
                let text = encoded_value_text(dex, value)?;
                let _ = writeln!(
                    out,
                    "{pad}{INDENT}{prefix}{ty} {} = {text};",
                    item.name(dex)?
                );
            }
            None => {
                let _ = writeln!(out, "{pad}{INDENT}{prefix}{ty} {};", item.name(dex)?);
            }
        }
    }
    for field in &data.instance_fields {
        let item = dex.field(field.field_idx)?;
        let ty = pretty_type(&item.type_descriptor(dex)?);
        let modifiers = field.access_flags.java_modifiers(false);
        let prefix = if modifiers.is_empty() {
            String::new()
        } else {
            format!("{modifiers} ")
        };
        let _ = writeln!(out, "{pad}{INDENT}{prefix}{ty} {};", item.name(dex)?);
    }
    if !data.static_fields.is_empty() || !data.instance_fields.is_empty() {
        out.push('\n');
    }

    for method in data.direct_methods.iter().chain(&data.virtual_methods) {
        dex_method(dex, method, display_name, arena, depth + 1, out)?;
    }

    // nested classes render inside their declaring class
    for &child in &node.children {
        out.push('\n');
        dex_class_body(dex, tree, child, arena, depth + 1, out)?;
    }

    let _ = writeln!(out, "{pad}}}");
    Ok(())
}

fn dex_method(
    dex: &Dex,
    method: &declass_dex::EncodedMethod,
    class_simple_name: &str,
    arena: &Bump,
    depth: usize,
    out: &mut String,
) -> Result<(), TaskError> {
    let item = dex.method(method.method_idx)?;
    let name = item.name(dex)?;
    let proto = item.proto(dex)?;
    let ret = pretty_type(&proto.return_type(dex)?);
    let params: Vec<String> = proto
        .parameters(dex)?
        .iter()
        .map(|idx| dex.type_descriptor(u32::from(*idx)).map(|d| pretty_type(&d)))
        .collect::<Result<_, _>>()?;
    let param_list: Vec<String> = params
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("{ty} p{i}"))
        .collect();

    let pad = INDENT.repeat(depth);
    let modifiers = method.access_flags.java_modifiers(true);
    let prefix = if modifiers.is_empty() {
        String::new()
    } else {
        format!("{modifiers} ")
    };

    let signature = match &*name {
        "<clinit>" => "static".to_owned(),
        "<init>" => format!(
            "{prefix}{class_simple_name}({})",
            param_list.join(", ")
        ),
        _ => format!("{prefix}{ret} {name}({})", param_list.join(", ")),
    };

    if method.code_off == 0 {
        // abstract or native
        let _ = writeln!(out, "{pad}{signature};");
        return Ok(());
    }

    let code = CodeItem::decode(dex, method.code_off)?;
    match crate::lift::dex::lift_method(arena, dex, method, &code) {
        Ok(body) => {
            if elidable(&body.stmts) && name != "<clinit>" {
                let _ = writeln!(out, "{pad}{signature} {{ }}");
                return Ok(());
            }
            let _ = writeln!(out, "{pad}{signature} {{");
            write_body_stmts(&body, params, depth, out);
            let _ = writeln!(out, "{pad}}}");
        }
        Err(err) => {
            // the method degrades to a commented stub with its raw smali
            warn!("{err}");
            let _ = writeln!(out, "{pad}{signature} {{");
            let _ = writeln!(out, "{pad}{INDENT}// can't decompile: {err}");
            let mut smali = String::new();
            if declass_dex::smali::write_body(dex, &code, &mut smali).is_ok() {
                let _ = writeln!(out, "{pad}{INDENT}/*");
                for line in smali.lines() {
                    let _ = writeln!(out, "{pad}{INDENT}{}", line.trim_start());
                }
                let _ = writeln!(out, "{pad}{INDENT}*/");
            }
            let _ = writeln!(out, "{pad}}}");
        }
    }
    Ok(())
}

fn write_body_stmts(body: &MethodBody<'_>, params: Vec<String>, depth: usize, out: &mut String) {
    let mut env = TypeEnv {
        locals: AHashMap::new(),
        params,
    };
    for (reg, ty) in &body.locals {
        env.locals.insert(*reg, *ty);
    }

    let mut writer = Writer {
        out: String::new(),
        depth: depth + 1,
        env,
    };
    // declarations up front, assignments throughout
    for (reg, ty) in &body.locals {
        writer.line(&format!("{ty} v{reg};"));
    }
    for stmt in &body.stmts {
        writer.stmt(stmt);
    }
    out.push_str(&writer.out);
}

fn encoded_value_text(dex: &Dex, value: &EncodedValue) -> Result<String, TaskError> {
    Ok(match value {
        EncodedValue::Byte(v) => format!("{v}"),
        EncodedValue::Short(v) => format!("{v}"),
        EncodedValue::Char(v) => format!("{v}"),
        EncodedValue::Int(v) => format!("{v}"),
        EncodedValue::Long(v) => format!("{v}L"),
        EncodedValue::Float(v) => float_literal(*v),
        EncodedValue::Double(v) => double_literal(*v),
        EncodedValue::String(idx) => format!("\"{}\"", escape_str(&dex.string(*idx)?)),
        EncodedValue::Type(idx) => format!("{}.class", pretty_type(&dex.type_descriptor(*idx)?)),
        EncodedValue::Enum(idx) | EncodedValue::Field(idx) => {
            let field = dex.field(*idx)?;
            format!(
                "{}.{}",
                pretty_type(&field.class(dex)?),
                field.name(dex)?
            )
        }
        EncodedValue::Method(idx) => {
            let method = dex.method(*idx)?;
            format!("/* method {} */ null", method.name(dex)?)
        }
        EncodedValue::Array(values) => {
            let parts: Vec<String> = values
                .iter()
                .map(|v| encoded_value_text(dex, v))
                .collect::<Result<_, _>>()?;
            format!("{{{}}}", parts.join(", "))
        }
        EncodedValue::Null => "null".to_owned(),
        EncodedValue::Boolean(v) => format!("{v}"),
    })
}

/// Render a parsed class file as Java source.
pub fn write_class_file(class: &ClassFile, arena: &Bump) -> Result<String, TaskError> {
    let internal = class.class_name()?.to_owned();
    let mut out = String::new();

    let package = crate::source::package_path(&internal).replace('/', ".");
    if !package.is_empty() {
        let _ = writeln!(out, "package {package};\n");
    }

    let simple = simple_name(&internal);
    let display_name = simple.rsplit('$').next().unwrap_or(simple);
    let kind = if class.access_flags.is_interface() {
        "interface"
    } else {
        "class"
    };
    let mut header = String::new();
    let modifiers = class.access_flags.java_modifiers(false);
    if !modifiers.is_empty() {
        let _ = write!(header, "{modifiers} ");
    }
    let _ = write!(header, "{kind} {display_name}");
    if let Some(superclass) = class.super_name()? {
        if superclass != "java/lang/Object" {
            let _ = write!(header, " extends {}", pretty_type(&format!("L{superclass};")));
        }
    }
    if !class.interfaces.is_empty() {
        let names: Vec<String> = class
            .interfaces
            .iter()
            .map(|idx| {
                class
                    .constant_pool
                    .class_name(*idx)
                    .map(|n| pretty_type(&format!("L{n};")))
            })
            .collect::<Result<_, _>>()?;
        let _ = write!(header, " implements {}", names.join(", "));
    }
    let _ = writeln!(out, "{header} {{");

    for field in &class.fields {
        let ty = pretty_type(class.member_descriptor(field)?);
        let modifiers = field.access_flags.java_modifiers(false);
        let prefix = if modifiers.is_empty() {
            String::new()
        } else {
            format!("{modifiers} ")
        };
        let _ = writeln!(out, "{INDENT}{prefix}{ty} {};", class.member_name(field)?);
    }
    if !class.fields.is_empty() {
        out.push('\n');
    }

    for method in &class.methods {
        let name = class.member_name(method)?.to_owned();
        let descriptor = class.member_descriptor(method)?;
        let (params, ret) = method_descriptor_parts(descriptor);
        let param_list: Vec<String> = params
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("{ty} p{i}"))
            .collect();

        let modifiers = method.access_flags.java_modifiers(true);
        let prefix = if modifiers.is_empty() {
            String::new()
        } else {
            format!("{modifiers} ")
        };
        let signature = match name.as_str() {
            "<clinit>" => "static".to_owned(),
            "<init>" => format!("{prefix}{display_name}({})", param_list.join(", ")),
            _ => format!("{prefix}{ret} {name}({})", param_list.join(", ")),
        };

        let Some(code) = class.code_of(method)? else {
            let _ = writeln!(out, "{INDENT}{signature};");
            continue;
        };

        match crate::lift::jvm::lift_method(arena, class, method, &code) {
            Ok(body) => {
                if elidable(&body.stmts) && name != "<clinit>" {
                    let _ = writeln!(out, "{INDENT}{signature} {{ }}");
                    continue;
                }
                let _ = writeln!(out, "{INDENT}{signature} {{");
                write_body_stmts(&body, params.clone(), 1, &mut out);
                let _ = writeln!(out, "{INDENT}}}");
            }
            Err(err) => {
                debug!("{err}");
                let _ = writeln!(out, "{INDENT}{signature} {{");
                let _ = writeln!(out, "{INDENT}{INDENT}// can't decompile: {err}");
                let _ = writeln!(
                    out,
                    "{INDENT}{INDENT}// {} bytes of bytecode",
                    code.code.len()
                );
                let _ = writeln!(out, "{INDENT}}}");
            }
        }
    }

    let _ = writeln!(out, "}}");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_pretty_print() {
        assert_eq!(pretty_type("I"), "int");
        assert_eq!(pretty_type("[I"), "int[]");
        assert_eq!(pretty_type("[[J"), "long[][]");
        assert_eq!(pretty_type("Ljava/lang/String;"), "String");
        assert_eq!(pretty_type("Lcom/a/B;"), "com.a.B");
        assert_eq!(pretty_type("Lcom/a/B$C;"), "com.a.B.C");
    }

    #[test]
    fn method_descriptors_split() {
        let (params, ret) = method_descriptor_parts("(I[JLjava/lang/String;)V");
        assert_eq!(params, ["int", "long[]", "String"]);
        assert_eq!(ret, "void");

        let (params, ret) = method_descriptor_parts("()[B");
        assert!(params.is_empty());
        assert_eq!(ret, "byte[]");
    }

    #[test]
    fn null_comparison_uses_reference_types() {
        let arena = Bump::new();
        let env = TypeEnv {
            locals: AHashMap::from_iter([(0u16, "String")]),
            params: Vec::new(),
        };
        let writer = Writer {
            out: String::new(),
            depth: 0,
            env,
        };
        let local = arena.alloc(Expr::Local(0));
        let zero = arena.alloc(Expr::Int(0));
        assert_eq!(writer.rel(RelOp::Eq, local, zero), "v0 == null");
    }

    #[test]
    fn cmp_feeding_zero_test_collapses() {
        let arena = Bump::new();
        let writer = Writer {
            out: String::new(),
            depth: 0,
            env: TypeEnv::default(),
        };
        let a = arena.alloc(Expr::Local(1));
        let b = arena.alloc(Expr::Local(2));
        let cmp = arena.alloc(Expr::Cmp {
            bias: CmpBias::None,
            lhs: a,
            rhs: b,
        });
        let zero = arena.alloc(Expr::Int(0));
        assert_eq!(writer.rel(RelOp::Gt, cmp, zero), "v1 > v2");
    }

    #[test]
    fn float_literals_survive_special_values() {
        assert_eq!(float_literal(f32::NAN), "Float.NaN");
        assert_eq!(double_literal(f64::INFINITY), "Double.POSITIVE_INFINITY");
        assert_eq!(float_literal(1.5), "1.5f");
    }
}
