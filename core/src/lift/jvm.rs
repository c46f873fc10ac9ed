//! Operand-stack symbolic execution for class-file methods.
//!
//! The stack machine nests expressions on its own, so no register spilling
//! is needed: loads push locals, stores pop into them, and the operand
//! stack must be empty at every block boundary (javac output keeps it so;
//! anything fancier degrades to the stub fallback).

use std::collections::BTreeMap;

use ahash::AHashMap;
use bumpalo::Bump;
use declass_jvm::code::{
    decode_code, InvokeKind, JBinOp, JCond, JConst, JKind, JvmInsn, JvmOp,
};
use declass_jvm::{ClassFile, CodeAttribute, Constant, Member};

use crate::errors::LiftError;
use crate::expr::{fold_binary, BinOp, CmpBias, Expr, ExprRef, InvokeTarget, RelOp, Stmt, UnOp};
use crate::java::{method_descriptor_parts, pretty_type};
use crate::lift::blocks::{Cfg, Flow};
use crate::lift::structure::{pair_monitors, Structurer, Term, TrySpan};
use crate::lift::MethodBody;

/// Lift one method body into structured statements.
pub fn lift_method<'a>(
    arena: &'a Bump,
    class: &ClassFile,
    member: &Member,
    code: &CodeAttribute,
) -> Result<MethodBody<'a>, LiftError> {
    let lifter = JvmLifter::new(arena, class, member, code)?;
    lifter.run(code)
}

struct JvmLifter<'a, 'c> {
    arena: &'a Bump,
    class: &'c ClassFile,
    method_name: String,
    insns: Vec<JvmInsn>,
    /// local slot → entry expression for parameters
    params: AHashMap<u16, ExprRef<'a>>,
    param_types: AHashMap<u16, &'a str>,
    written: ahash::AHashSet<u16>,
    /// handler entry offset → (exception var, expression)
    handlers: AHashMap<usize, (u16, ExprRef<'a>)>,
    exceptions: Vec<(u16, String)>,
    local_types: BTreeMap<u16, &'a str>,
}

impl<'a, 'c> JvmLifter<'a, 'c> {
    fn new(
        arena: &'a Bump,
        class: &'c ClassFile,
        member: &Member,
        code: &CodeAttribute,
    ) -> Result<JvmLifter<'a, 'c>, LiftError> {
        let method_name = format!(
            "{}.{}",
            class.class_name().unwrap_or("<unknown>"),
            class.member_name(member).unwrap_or("<unknown>")
        );
        let fail = |offset: usize, e: &dyn std::fmt::Display| {
            LiftError::new(method_name.clone(), offset, e.to_string())
        };

        let insns = decode_code(&code.code).map_err(|e| fail(0, &e))?;
        if insns.is_empty() {
            return Err(fail(0, &"empty bytecode"));
        }

        let mut written = ahash::AHashSet::new();
        for insn in &insns {
            match insn.op {
                JvmOp::Store { slot, .. } | JvmOp::Iinc { slot, .. } => {
                    written.insert(slot);
                }
                _ => {}
            }
        }

        let descriptor = class.member_descriptor(member).map_err(|e| fail(0, &e))?;
        let (param_list, _) = method_descriptor_parts(descriptor);
        let mut params = AHashMap::new();
        let mut param_types = AHashMap::new();
        let mut slot = 0u16;
        if !member.access_flags.is_static() {
            params.insert(slot, &*arena.alloc(Expr::This));
            let name = pretty_type(&format!("L{};", class.class_name().map_err(|e| fail(0, &e))?));
            param_types.insert(slot, &*arena.alloc_str(&name));
            slot += 1;
        }
        for (ordinal, param) in param_list.iter().enumerate() {
            params.insert(slot, &*arena.alloc(Expr::Param(ordinal as u16)));
            param_types.insert(slot, &*arena.alloc_str(param));
            slot += if param == "long" || param == "double" {
                2
            } else {
                1
            };
        }

        let mut handlers: AHashMap<usize, (u16, ExprRef<'a>)> = AHashMap::new();
        let mut exceptions = Vec::new();
        for entry in &code.exceptions {
            let offset = entry.handler_pc as usize;
            if handlers.contains_key(&offset) {
                continue;
            }
            let ty = if entry.catch_type == 0 {
                "Throwable".to_owned()
            } else {
                class
                    .constant_pool
                    .class_name(entry.catch_type)
                    .map(|name| pretty_type(&format!("L{name};")))
                    .unwrap_or_else(|_| "Throwable".to_owned())
            };
            let var = exceptions.len() as u16;
            exceptions.push((var, ty));
            handlers.insert(offset, (var, &*arena.alloc(Expr::Caught(var))));
        }

        Ok(JvmLifter {
            arena,
            class,
            method_name,
            insns,
            params,
            param_types,
            written,
            handlers,
            exceptions,
            local_types: BTreeMap::new(),
        })
    }

    fn error(&self, offset: usize, reason: impl Into<String>) -> LiftError {
        LiftError::new(self.method_name.clone(), offset, reason)
    }

    fn run(mut self, code: &CodeAttribute) -> Result<MethodBody<'a>, LiftError> {
        let offsets: Vec<usize> = self.insns.iter().map(|insn| insn.offset).collect();
        let flows: Vec<Flow> = self.insns.iter().map(flow_of).collect();

        let mut extra_leaders = Vec::new();
        for entry in &code.exceptions {
            extra_leaders.push(entry.start_pc as usize);
            extra_leaders.push(entry.end_pc as usize);
            extra_leaders.push(entry.handler_pc as usize);
        }

        let cfg = Cfg::build(&offsets, &flows, &extra_leaders);
        let block_count = cfg.blocks.len();
        let block_offset: Vec<usize> = cfg
            .blocks
            .iter()
            .map(|block| self.insns[block.lo].offset)
            .collect();

        let mut preamble = Vec::new();
        let param_slots: Vec<u16> = self.params.keys().copied().collect();
        for slot in param_slots {
            if self.written.contains(&slot) {
                let value = self.params[&slot];
                self.declare(slot, self.param_types[&slot]);
                preamble.push(Stmt::Assign {
                    target: self.arena.alloc(Expr::Local(slot)),
                    value,
                });
            }
        }

        let mut order = cfg.rpo.clone();
        let mut seen: ahash::AHashSet<usize> = order.iter().copied().collect();
        for b in 0..block_count {
            if seen.insert(b) {
                order.push(b);
            }
        }

        let mut stmts_per_block: Vec<Vec<Stmt<'a>>> = vec![Vec::new(); block_count];
        let mut terms: Vec<Option<Term<'a>>> = Vec::with_capacity(block_count);
        terms.resize_with(block_count, || None);
        for &b in &order {
            let (stmts, term) = self.exec_block(&cfg, b)?;
            stmts_per_block[b] = stmts;
            terms[b] = Some(term);
        }
        let terms: Vec<Term<'a>> = terms.into_iter().map(Option::unwrap).collect();

        let tries = self.try_spans(&cfg, code)?;
        let mut stmts = Structurer::run(
            self.arena,
            &cfg,
            block_offset,
            stmts_per_block,
            terms,
            tries,
        );
        if !preamble.is_empty() {
            preamble.append(&mut stmts);
            stmts = preamble;
        }
        let stmts = pair_monitors(stmts);

        Ok(MethodBody {
            stmts,
            locals: self.local_types.into_iter().collect(),
            exceptions: self.exceptions,
        })
    }

    fn try_spans(&self, cfg: &Cfg, code: &CodeAttribute) -> Result<Vec<TrySpan>, LiftError> {
        // ranges with the same extent merge their handlers into one span
        let mut spans: Vec<(u16, u16, TrySpan)> = Vec::new();
        for entry in &code.exceptions {
            let start_block = *cfg
                .block_at
                .get(&(entry.start_pc as usize))
                .ok_or_else(|| {
                    self.error(entry.start_pc as usize, "try range between instructions")
                })?;
            let cont_block = cfg.block_at.get(&(entry.end_pc as usize)).copied();
            let handler_block = *cfg
                .block_at
                .get(&(entry.handler_pc as usize))
                .ok_or_else(|| {
                    self.error(entry.handler_pc as usize, "handler between instructions")
                })?;
            let var = self.handlers[&(entry.handler_pc as usize)].0;
            let ty = if entry.catch_type == 0 {
                None
            } else {
                Some(
                    self.class
                        .constant_pool
                        .class_name(entry.catch_type)
                        .map(|name| pretty_type(&format!("L{name};")))
                        .map_err(|e| self.error(entry.start_pc as usize, e.to_string()))?,
                )
            };

            match spans
                .iter_mut()
                .find(|(s, e, _)| *s == entry.start_pc && *e == entry.end_pc)
            {
                Some((_, _, span)) => span.catches.push((ty, var, handler_block)),
                None => spans.push((
                    entry.start_pc,
                    entry.end_pc,
                    TrySpan {
                        start_block,
                        cont_block,
                        catches: vec![(ty, var, handler_block)],
                    },
                )),
            }
        }
        Ok(spans.into_iter().map(|(_, _, span)| span).collect())
    }

    fn declare(&mut self, slot: u16, ty: &'a str) {
        self.local_types.entry(slot).or_insert(ty);
    }

    fn local(&self, slot: u16) -> ExprRef<'a> {
        if let Some(&expr) = self.params.get(&slot) {
            if !self.written.contains(&slot) {
                return expr;
            }
        }
        self.arena.alloc(Expr::Local(slot))
    }

    fn exec_block(
        &mut self,
        cfg: &Cfg,
        b: usize,
    ) -> Result<(Vec<Stmt<'a>>, Term<'a>), LiftError> {
        let lo = cfg.blocks[b].lo;
        let hi = cfg.blocks[b].hi;
        let block_start = self.insns[lo].offset;

        let mut stmts: Vec<Stmt<'a>> = Vec::new();
        let mut stack: Vec<ExprRef<'a>> = Vec::new();
        if let Some(&(_, caught)) = self.handlers.get(&block_start) {
            stack.push(caught);
        }
        let mut term: Option<Term<'a>> = None;
        let method_name = self.method_name.clone();

        for index in lo..hi {
            let insn = self.insns[index].clone();
            let offset = insn.offset;
            let pop = |stack: &mut Vec<ExprRef<'a>>| {
                stack
                    .pop()
                    .ok_or_else(|| {
                        LiftError::new(method_name.clone(), offset, "operand stack underflow")
                    })
            };

            match insn.op {
                JvmOp::Nop => {}
                JvmOp::Const(constant) => stack.push(self.constant(constant, offset)?),
                JvmOp::Load { slot, .. } => stack.push(self.local(slot)),
                JvmOp::Store { slot, .. } => {
                    let value = pop(&mut stack)?;
                    self.declare(slot, value.java_type());
                    stmts.push(Stmt::Assign {
                        target: self.arena.alloc(Expr::Local(slot)),
                        value,
                    });
                }
                JvmOp::ArrayLoad(_) => {
                    let index_expr = pop(&mut stack)?;
                    let array = pop(&mut stack)?;
                    stack.push(self.arena.alloc(Expr::ArrayGet {
                        array,
                        index: index_expr,
                    }));
                }
                JvmOp::ArrayStore(_) => {
                    let value = pop(&mut stack)?;
                    let index_expr = pop(&mut stack)?;
                    let array = pop(&mut stack)?;
                    let target = self.arena.alloc(Expr::ArrayGet {
                        array,
                        index: index_expr,
                    });
                    stmts.push(Stmt::Assign { target, value });
                }
                JvmOp::Pop | JvmOp::Pop2 => {
                    let value = pop(&mut stack)?;
                    if matches!(value, Expr::Invoke { .. }) {
                        stmts.push(Stmt::Expr(value));
                    }
                }
                JvmOp::Dup => {
                    let top = *stack
                        .last()
                        .ok_or_else(|| self.error(offset, "dup on empty stack"))?;
                    if !top.is_pure() && !matches!(top, Expr::NewInstance { .. }) {
                        return Err(self.error(offset, "dup of an impure value"));
                    }
                    stack.push(top);
                }
                JvmOp::Swap => {
                    let len = stack.len();
                    if len < 2 {
                        return Err(self.error(offset, "swap on short stack"));
                    }
                    stack.swap(len - 1, len - 2);
                }
                JvmOp::Binary(op, kind) => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    let wide = matches!(kind, JKind::Long | JKind::Double);
                    stack.push(fold_binary(self.arena, bin_of(op), wide, lhs, rhs));
                }
                JvmOp::Neg(_) => {
                    let operand = pop(&mut stack)?;
                    stack.push(self.arena.alloc(Expr::Unary {
                        op: UnOp::Neg,
                        operand,
                    }));
                }
                JvmOp::Iinc { slot, delta } => {
                    let target = self.arena.alloc(Expr::Local(slot));
                    let lhs = self.local(slot);
                    let rhs = self.arena.alloc(Expr::Int(i64::from(delta)));
                    self.declare(slot, "int");
                    let value = fold_binary(self.arena, BinOp::Add, false, lhs, rhs);
                    stmts.push(Stmt::Assign { target, value });
                }
                JvmOp::Convert { to, .. } => {
                    let operand = pop(&mut stack)?;
                    let ty = kind_name(to);
                    stack.push(self.arena.alloc(Expr::Cast { ty, operand }));
                }
                JvmOp::Cmp { kind, gt_bias } => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    let bias = if matches!(kind, JKind::Long) {
                        CmpBias::None
                    } else if gt_bias {
                        CmpBias::Greater
                    } else {
                        CmpBias::Less
                    };
                    stack.push(self.arena.alloc(Expr::Cmp { bias, lhs, rhs }));
                }
                JvmOp::If { cond, target } => {
                    let lhs = pop(&mut stack)?;
                    let rhs = self.arena.alloc(Expr::Int(0));
                    term = Some(self.branch(cfg, &insn, rel_of(cond), lhs, rhs, target, offset)?);
                }
                JvmOp::IfCmp { cond, target, .. } => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    term = Some(self.branch(cfg, &insn, rel_of(cond), lhs, rhs, target, offset)?);
                }
                JvmOp::IfNull { invert, target } => {
                    let lhs = pop(&mut stack)?;
                    let rhs = self.arena.alloc(Expr::Null);
                    let op = if invert { RelOp::Ne } else { RelOp::Eq };
                    term = Some(self.branch(cfg, &insn, op, lhs, rhs, target, offset)?);
                }
                JvmOp::Goto { target } => {
                    term = Some(Term::Goto(self.block_of(cfg, target, offset)?));
                }
                JvmOp::Switch {
                    ref keys,
                    ref targets,
                    default,
                } => {
                    let scrutinee = pop(&mut stack)?;
                    let mut cases: Vec<(Vec<i32>, usize)> = Vec::new();
                    for (key, target) in keys.iter().zip(targets) {
                        let block = self.block_of(cfg, *target, offset)?;
                        match cases.iter_mut().find(|(_, existing)| *existing == block) {
                            Some((keys, _)) => keys.push(*key),
                            None => cases.push((vec![*key], block)),
                        }
                    }
                    let default = self.block_of(cfg, default, offset)?;
                    term = Some(Term::Switch {
                        scrutinee,
                        cases,
                        default,
                    });
                }
                JvmOp::Return { kind } => {
                    let value = match kind {
                        Some(_) => Some(pop(&mut stack)?),
                        None => None,
                    };
                    term = Some(Term::Return(value));
                }
                JvmOp::GetStatic { index } => {
                    let expr = self.field(None, index, offset)?;
                    stack.push(expr);
                }
                JvmOp::PutStatic { index } => {
                    let value = pop(&mut stack)?;
                    let target = self.field(None, index, offset)?;
                    stmts.push(Stmt::Assign { target, value });
                }
                JvmOp::GetField { index } => {
                    let object = pop(&mut stack)?;
                    let expr = self.field(Some(object), index, offset)?;
                    stack.push(expr);
                }
                JvmOp::PutField { index } => {
                    let value = pop(&mut stack)?;
                    let object = pop(&mut stack)?;
                    let target = self.field(Some(object), index, offset)?;
                    stmts.push(Stmt::Assign { target, value });
                }
                JvmOp::Invoke { kind, index } => {
                    self.invoke(&mut stack, &mut stmts, kind, index, offset)?;
                }
                JvmOp::New { index } => {
                    let name = self
                        .class
                        .constant_pool
                        .class_name(index)
                        .map_err(|e| self.error(offset, e.to_string()))?;
                    let ty = self.arena.alloc_str(&pretty_type(&format!("L{name};")));
                    stack.push(self.arena.alloc(Expr::NewInstance { ty }));
                }
                JvmOp::NewPrimArray { atype } => {
                    let size = pop(&mut stack)?;
                    let ty = self.arena.alloc_str(&format!("{}[]", prim_array(atype)));
                    stack.push(self.arena.alloc(Expr::NewArray { ty, size }));
                }
                JvmOp::NewRefArray { index } => {
                    let size = pop(&mut stack)?;
                    let name = self
                        .class
                        .constant_pool
                        .class_name(index)
                        .map_err(|e| self.error(offset, e.to_string()))?;
                    let element = if name.starts_with('[') {
                        pretty_type(&name)
                    } else {
                        pretty_type(&format!("L{name};"))
                    };
                    let ty = self.arena.alloc_str(&format!("{element}[]"));
                    stack.push(self.arena.alloc(Expr::NewArray { ty, size }));
                }
                JvmOp::ArrayLength => {
                    let array = pop(&mut stack)?;
                    stack.push(self.arena.alloc(Expr::ArrayLength(array)));
                }
                JvmOp::Throw => {
                    let value = pop(&mut stack)?;
                    term = Some(Term::Throw(value));
                }
                JvmOp::CheckCast { index } => {
                    let operand = pop(&mut stack)?;
                    let name = self
                        .class
                        .constant_pool
                        .class_name(index)
                        .map_err(|e| self.error(offset, e.to_string()))?;
                    let ty: &'a str = if name.starts_with('[') {
                        self.arena.alloc_str(&pretty_type(&name))
                    } else {
                        self.arena.alloc_str(&pretty_type(&format!("L{name};")))
                    };
                    stack.push(self.arena.alloc(Expr::Cast { ty, operand }));
                }
                JvmOp::InstanceOf { index } => {
                    let operand = pop(&mut stack)?;
                    let name = self
                        .class
                        .constant_pool
                        .class_name(index)
                        .map_err(|e| self.error(offset, e.to_string()))?;
                    let ty = self.arena.alloc_str(&pretty_type(&format!("L{name};")));
                    stack.push(self.arena.alloc(Expr::InstanceOf { ty, operand }));
                }
                JvmOp::Monitor { enter } => {
                    let value = pop(&mut stack)?;
                    stmts.push(if enter {
                        Stmt::MonitorEnter(value)
                    } else {
                        Stmt::MonitorExit(value)
                    });
                }
            }
        }

        if !stack.is_empty() {
            return Err(self.error(
                self.insns[hi - 1].offset,
                "operand stack not empty at block boundary",
            ));
        }

        Ok((stmts, term.unwrap_or(Term::Next)))
    }

    fn constant(&mut self, constant: JConst, offset: usize) -> Result<ExprRef<'a>, LiftError> {
        Ok(match constant {
            JConst::Null => self.arena.alloc(Expr::Null),
            JConst::Int(v) => self.arena.alloc(Expr::Int(i64::from(v))),
            JConst::Long(v) => self.arena.alloc(Expr::Long(v)),
            JConst::Float(v) => self.arena.alloc(Expr::Float(v)),
            JConst::Double(v) => self.arena.alloc(Expr::Double(v)),
            JConst::Pool(index) => {
                let entry = self
                    .class
                    .constant_pool
                    .get(index)
                    .map_err(|e| self.error(offset, e.to_string()))?;
                match entry {
                    Constant::Integer(v) => self.arena.alloc(Expr::Int(i64::from(*v))),
                    Constant::Long(v) => self.arena.alloc(Expr::Long(*v)),
                    Constant::Float(v) => self.arena.alloc(Expr::Float(*v)),
                    Constant::Double(v) => self.arena.alloc(Expr::Double(*v)),
                    Constant::String(utf8) => {
                        let text = self
                            .class
                            .constant_pool
                            .utf8(*utf8)
                            .map_err(|e| self.error(offset, e.to_string()))?;
                        let interned = self.arena.alloc_str(text);
                        self.arena.alloc(Expr::Str(interned))
                    }
                    Constant::Class(name_idx) => {
                        let name = self
                            .class
                            .constant_pool
                            .utf8(*name_idx)
                            .map_err(|e| self.error(offset, e.to_string()))?;
                        let pretty = pretty_type(&format!("L{name};"));
                        self.arena.alloc(Expr::ClassLit(self.arena.alloc_str(&pretty)))
                    }
                    other => {
                        return Err(
                            self.error(offset, format!("unsupported ldc constant {other:?}"))
                        )
                    }
                }
            }
        })
    }

    fn field(
        &mut self,
        object: Option<ExprRef<'a>>,
        index: u16,
        offset: usize,
    ) -> Result<ExprRef<'a>, LiftError> {
        let (class_name, name, descriptor) = self
            .class
            .constant_pool
            .member_ref(index)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let class = self
            .arena
            .alloc_str(&pretty_type(&format!("L{class_name};")));
        let name = self.arena.alloc_str(name);
        let ty = self.arena.alloc_str(&pretty_type(descriptor));
        Ok(self.arena.alloc(Expr::FieldGet {
            object,
            class,
            name,
            ty,
        }))
    }

    fn invoke(
        &mut self,
        stack: &mut Vec<ExprRef<'a>>,
        stmts: &mut Vec<Stmt<'a>>,
        kind: InvokeKind,
        index: u16,
        offset: usize,
    ) -> Result<(), LiftError> {
        let (class_name, name, descriptor) = self
            .class
            .constant_pool
            .member_ref(index)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let (params, ret) = method_descriptor_parts(descriptor);

        let mut args = Vec::with_capacity(params.len());
        for _ in 0..params.len() {
            args.push(stack.pop().ok_or_else(|| {
                self.error(offset, "argument stack underflow")
            })?);
        }
        args.reverse();
        let args = &*self.arena.alloc_slice_copy(&args);

        let object = if matches!(kind, InvokeKind::Static) {
            None
        } else {
            Some(
                stack
                    .pop()
                    .ok_or_else(|| self.error(offset, "receiver stack underflow"))?,
            )
        };

        // new + dup + <init> collapses into a constructor expression
        if matches!(kind, InvokeKind::Special) && name == "<init>" {
            if let Some(receiver) = object {
                if let Expr::NewInstance { ty } = receiver {
                    let ty = *ty;
                    let fused: ExprRef<'a> = self.arena.alloc(Expr::NewObject { ty, args });
                    let mut replaced = false;
                    for slot in stack.iter_mut() {
                        if std::ptr::eq::<Expr<'_>>(*slot, receiver) {
                            *slot = fused;
                            replaced = true;
                        }
                    }
                    if !replaced {
                        // `new X()` used purely for effect
                        stmts.push(Stmt::Expr(fused));
                    }
                    return Ok(());
                }
            }
        }

        let target = match kind {
            InvokeKind::Virtual => InvokeTarget::Virtual,
            InvokeKind::Special => InvokeTarget::Direct,
            InvokeKind::Static => InvokeTarget::Static,
            InvokeKind::Interface => InvokeTarget::Interface,
        };
        let class = self
            .arena
            .alloc_str(&pretty_type(&format!("L{class_name};")));
        let interned_name = self.arena.alloc_str(name);
        let ret_str = self.arena.alloc_str(&ret);
        let invoke = self.arena.alloc(Expr::Invoke {
            target,
            object,
            class,
            name: interned_name,
            args,
            ret: ret_str,
        });

        if ret == "void" {
            stmts.push(Stmt::Expr(invoke));
        } else {
            stack.push(invoke);
        }
        Ok(())
    }

    fn branch(
        &mut self,
        cfg: &Cfg,
        insn: &JvmInsn,
        op: RelOp,
        lhs: ExprRef<'a>,
        rhs: ExprRef<'a>,
        target: usize,
        offset: usize,
    ) -> Result<Term<'a>, LiftError> {
        let cond = self.arena.alloc(Expr::Rel { op, lhs, rhs });
        // conditional branches are three bytes wide
        let fall = insn.offset + 3;
        Ok(Term::If {
            cond,
            then_block: self.block_of(cfg, target, offset)?,
            else_block: self.block_of(cfg, fall, offset)?,
        })
    }

    fn block_of(&self, cfg: &Cfg, target: usize, offset: usize) -> Result<usize, LiftError> {
        cfg.block_at
            .get(&target)
            .copied()
            .ok_or_else(|| self.error(offset, "branch target is not a block leader"))
    }
}

fn flow_of(insn: &JvmInsn) -> Flow {
    match &insn.op {
        JvmOp::Goto { target } => Flow::Jump(*target),
        JvmOp::If { target, .. }
        | JvmOp::IfCmp { target, .. }
        | JvmOp::IfNull { target, .. } => Flow::Branch(*target),
        JvmOp::Switch {
            targets, default, ..
        } => {
            let mut all = targets.clone();
            all.push(*default);
            Flow::Switch {
                targets: all,
                fall: false,
            }
        }
        JvmOp::Return { .. } | JvmOp::Throw => Flow::Halt,
        _ => Flow::Fall,
    }
}

fn bin_of(op: JBinOp) -> BinOp {
    match op {
        JBinOp::Add => BinOp::Add,
        JBinOp::Sub => BinOp::Sub,
        JBinOp::Mul => BinOp::Mul,
        JBinOp::Div => BinOp::Div,
        JBinOp::Rem => BinOp::Rem,
        JBinOp::Shl => BinOp::Shl,
        JBinOp::Shr => BinOp::Shr,
        JBinOp::Ushr => BinOp::Ushr,
        JBinOp::And => BinOp::And,
        JBinOp::Or => BinOp::Or,
        JBinOp::Xor => BinOp::Xor,
    }
}

fn rel_of(cond: JCond) -> RelOp {
    match cond {
        JCond::Eq => RelOp::Eq,
        JCond::Ne => RelOp::Ne,
        JCond::Lt => RelOp::Lt,
        JCond::Ge => RelOp::Ge,
        JCond::Gt => RelOp::Gt,
        JCond::Le => RelOp::Le,
    }
}

fn kind_name(kind: JKind) -> &'static str {
    match kind {
        JKind::Int => "int",
        JKind::Long => "long",
        JKind::Float => "float",
        JKind::Double => "double",
        JKind::Ref => "Object",
        JKind::Byte => "byte",
        JKind::Char => "char",
        JKind::Short => "short",
        JKind::Bool => "boolean",
    }
}

/// newarray atype codes.
fn prim_array(atype: u8) -> &'static str {
    match atype {
        4 => "boolean",
        5 => "char",
        6 => "float",
        7 => "double",
        8 => "byte",
        9 => "short",
        10 => "int",
        _ => "long",
    }
}
