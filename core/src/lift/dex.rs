//! Register symbolic execution over decoded Dalvik instructions.
//!
//! Blocks are walked in reverse post-order; registers hold expression
//! trees. Pure expressions propagate across straight-line block chains,
//! and are spilled to register-named locals (`vN`) at joins and loop
//! headers so every path agrees on where a value lives. Calls never float:
//! an invoke result is assigned to its local the moment `move-result`
//! claims it, which keeps side effects in instruction order.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use bumpalo::Bump;
use declass_dex::insns::{decode_insns, Insn, Opcode, Operands};
use declass_dex::{CodeItem, Dex, EncodedMethod};

use crate::errors::LiftError;
use crate::expr::{fold_binary, BinOp, CmpBias, Expr, ExprRef, InvokeTarget, RelOp, Stmt, UnOp};
use crate::java::pretty_type;
use crate::lift::blocks::{Cfg, Flow};
use crate::lift::structure::{pair_monitors, Structurer, Term, TrySpan};
use crate::lift::MethodBody;

/// Lift one method with a body into structured statements.
pub fn lift_method<'a>(
    arena: &'a Bump,
    dex: &Dex,
    method: &EncodedMethod,
    code: &CodeItem,
) -> Result<MethodBody<'a>, LiftError> {
    let lifter = Lifter::new(arena, dex, method, code)?;
    lifter.run(code)
}

struct Lifter<'a, 'd> {
    arena: &'a Bump,
    dex: &'d Dex,
    method_name: String,
    insns: Vec<Insn>,
    /// code-unit offset → instruction index
    index_at: AHashMap<usize, usize>,
    /// registers written anywhere in the method
    written: AHashSet<u16>,
    /// parameter register → its entry expression
    params: AHashMap<u16, ExprRef<'a>>,
    /// parameter register → pretty type (for spill declarations)
    param_types: AHashMap<u16, &'a str>,
    /// handler entry offset → (exception var, expression)
    handlers: AHashMap<usize, (u16, ExprRef<'a>)>,
    exceptions: Vec<(u16, String)>,
    local_types: BTreeMap<u16, &'a str>,
    /// blocks covered by a try range always spill, so handlers find every
    /// value in its local
    try_blocks: AHashSet<usize>,
}

/// Per-block execution output before structuring.
struct Lifted<'a> {
    stmts: Vec<Stmt<'a>>,
    term: Term<'a>,
    state: Vec<Option<ExprRef<'a>>>,
}

impl<'a, 'd> Lifter<'a, 'd> {
    fn new(
        arena: &'a Bump,
        dex: &'d Dex,
        method: &EncodedMethod,
        code: &CodeItem,
    ) -> Result<Lifter<'a, 'd>, LiftError> {
        let item = dex
            .method(method.method_idx)
            .map_err(|e| LiftError::new("<unknown>", 0, e.to_string()))?;
        let method_name = format!(
            "{}->{}",
            item.class(dex).unwrap_or_default(),
            item.name(dex).unwrap_or_default()
        );
        let fail = |offset: usize, e: &dyn std::fmt::Display| {
            LiftError::new(method_name.clone(), offset, e.to_string())
        };

        let insns = decode_insns(&code.insns).map_err(|e| fail(0, &e))?;
        if insns.is_empty() {
            return Err(fail(0, &"empty instruction stream"));
        }
        let index_at: AHashMap<usize, usize> = insns
            .iter()
            .enumerate()
            .map(|(i, insn)| (insn.offset, i))
            .collect();

        let mut written = AHashSet::new();
        for insn in &insns {
            if let Some(reg) = dest_of(insn) {
                written.insert(reg);
            }
        }

        // parameter registers occupy the top of the frame
        let mut params = AHashMap::new();
        let mut param_types = AHashMap::new();
        let mut reg = code.registers_size.saturating_sub(code.ins_size);
        let mut ordinal = 0u16;
        if !method.access_flags.is_static() {
            params.insert(reg, &*arena.alloc(Expr::This));
            let this_ty =
                arena.alloc_str(&pretty_type(&item.class(dex).map_err(|e| fail(0, &e))?));
            param_types.insert(reg, &*this_ty);
            reg += 1;
        }
        let proto = item.proto(dex).map_err(|e| fail(0, &e))?;
        for type_idx in proto.parameters(dex).map_err(|e| fail(0, &e))? {
            let descriptor = dex
                .type_descriptor(type_idx.into())
                .map_err(|e| fail(0, &e))?;
            let pretty: &'a str = arena.alloc_str(&pretty_type(&descriptor));
            params.insert(reg, &*arena.alloc(Expr::Param(ordinal)));
            param_types.insert(reg, pretty);
            let wide = matches!(&*descriptor, "J" | "D");
            reg += if wide { 2 } else { 1 };
            ordinal += 1;
        }

        // one exception variable per distinct handler entry
        let mut handlers: AHashMap<usize, (u16, ExprRef<'a>)> = AHashMap::new();
        let mut exceptions = Vec::new();
        for try_item in &code.tries {
            let mut register = |addr: u32, ty: Option<String>| {
                let offset = addr as usize;
                if !handlers.contains_key(&offset) {
                    let var = exceptions.len() as u16;
                    exceptions.push((var, ty.unwrap_or_else(|| "Throwable".to_owned())));
                    handlers.insert(offset, (var, &*arena.alloc(Expr::Caught(var))));
                }
            };
            for (type_idx, addr) in &try_item.handlers.catches {
                let ty = dex
                    .type_descriptor(*type_idx)
                    .map(|d| pretty_type(&d))
                    .ok();
                register(*addr, ty);
            }
            if let Some(addr) = try_item.handlers.catch_all {
                register(addr, None);
            }
        }

        Ok(Lifter {
            arena,
            dex,
            method_name,
            insns,
            index_at,
            written,
            params,
            param_types,
            handlers,
            exceptions,
            local_types: BTreeMap::new(),
            try_blocks: AHashSet::new(),
        })
    }

    fn error(&self, offset: usize, reason: impl Into<String>) -> LiftError {
        LiftError::new(self.method_name.clone(), offset, reason)
    }

    fn run(mut self, code: &CodeItem) -> Result<MethodBody<'a>, LiftError> {
        let offsets: Vec<usize> = self.insns.iter().map(|insn| insn.offset).collect();
        let flows: Vec<Flow> = self.insns.iter().map(flow_of).collect();

        let mut extra_leaders = Vec::new();
        for try_item in &code.tries {
            extra_leaders.push(try_item.start_addr as usize);
            extra_leaders.push((try_item.start_addr + u32::from(try_item.insn_count)) as usize);
            for (_, addr) in &try_item.handlers.catches {
                extra_leaders.push(*addr as usize);
            }
            if let Some(addr) = try_item.handlers.catch_all {
                extra_leaders.push(addr as usize);
            }
        }

        let cfg = Cfg::build(&offsets, &flows, &extra_leaders);
        let block_count = cfg.blocks.len();
        for try_item in &code.tries {
            let start = try_item.start_addr as usize;
            let end = start + try_item.insn_count as usize;
            for (b, block) in cfg.blocks.iter().enumerate() {
                let off = self.insns[block.lo].offset;
                if off >= start && off < end {
                    self.try_blocks.insert(b);
                }
            }
        }
        let block_offset: Vec<usize> = cfg
            .blocks
            .iter()
            .map(|block| self.insns[block.lo].offset * 2)
            .collect();

        // preamble: parameters that are ever reassigned live in their
        // register-named local from the start
        let mut preamble = Vec::new();
        let param_regs: Vec<u16> = self.params.keys().copied().collect();
        for reg in param_regs {
            if self.written.contains(&reg) {
                let value = self.params[&reg];
                self.declare(reg, self.param_types[&reg]);
                preamble.push(Stmt::Assign {
                    target: self.arena.alloc(Expr::Local(reg)),
                    value,
                });
            }
        }

        // execute entry-reachable blocks in RPO, then handler-only chains
        let mut order = cfg.rpo.clone();
        let mut seen: AHashSet<usize> = order.iter().copied().collect();
        for b in 0..block_count {
            if seen.insert(b) {
                order.push(b);
            }
        }

        let registers = code.registers_size as usize;
        let mut outs: Vec<Option<Lifted<'a>>> = Vec::with_capacity(block_count);
        outs.resize_with(block_count, || None);
        for &b in &order {
            let state = self.entry_state(&cfg, &outs, b, registers);
            let lifted = self.exec_block(&cfg, b, state)?;
            outs[b] = Some(lifted);
        }

        let mut stmts_per_block = Vec::with_capacity(block_count);
        let mut terms = Vec::with_capacity(block_count);
        for out in outs {
            let lifted = out.expect("every block executed");
            stmts_per_block.push(lifted.stmts);
            terms.push(lifted.term);
        }

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

    fn try_spans(&self, cfg: &Cfg, code: &CodeItem) -> Result<Vec<TrySpan>, LiftError> {
        let mut spans = Vec::with_capacity(code.tries.len());
        for try_item in &code.tries {
            let start = try_item.start_addr as usize;
            let end = start + try_item.insn_count as usize;
            let start_block = *cfg
                .block_at
                .get(&start)
                .ok_or_else(|| self.error(start, "try range starts between instructions"))?;
            let cont_block = cfg.block_at.get(&end).copied();

            let mut catches = Vec::new();
            for (type_idx, addr) in &try_item.handlers.catches {
                let ty = self
                    .dex
                    .type_descriptor(*type_idx)
                    .map(|d| pretty_type(&d))
                    .map_err(|e| self.error(start, e.to_string()))?;
                let block = *cfg
                    .block_at
                    .get(&(*addr as usize))
                    .ok_or_else(|| self.error(*addr as usize, "handler between instructions"))?;
                let var = self.handlers[&(*addr as usize)].0;
                catches.push((Some(ty), var, block));
            }
            if let Some(addr) = try_item.handlers.catch_all {
                let block = *cfg
                    .block_at
                    .get(&(addr as usize))
                    .ok_or_else(|| self.error(addr as usize, "handler between instructions"))?;
                let var = self.handlers[&(addr as usize)].0;
                catches.push((None, var, block));
            }

            spans.push(TrySpan {
                start_block,
                cont_block,
                catches,
            });
        }
        Ok(spans)
    }

    fn entry_state(
        &self,
        cfg: &Cfg,
        outs: &[Option<Lifted<'a>>],
        b: usize,
        registers: usize,
    ) -> Vec<Option<ExprRef<'a>>> {
        if b == 0 {
            let mut state = vec![None; registers];
            for (&reg, &expr) in &self.params {
                state[reg as usize] = Some(if self.written.contains(&reg) {
                    &*self.arena.alloc(Expr::Local(reg))
                } else {
                    expr
                });
            }
            return state;
        }

        let preds = &cfg.blocks[b].preds;
        let single_chain = preds.len() == 1
            && !cfg.is_loop_header(b)
            && outs[preds[0]].as_ref().is_some();
        if single_chain {
            return outs[preds[0]].as_ref().unwrap().state.clone();
        }

        // join: every written register lives in its spill local
        let mut state = vec![None; registers];
        for &reg in &self.written {
            state[reg as usize] = Some(&*self.arena.alloc(Expr::Local(reg)));
        }
        for (&reg, &expr) in &self.params {
            if !self.written.contains(&reg) {
                state[reg as usize] = Some(expr);
            }
        }
        state
    }

    fn declare(&mut self, reg: u16, ty: &'a str) {
        self.local_types.entry(reg).or_insert(ty);
    }

    fn exec_block(
        &mut self,
        cfg: &Cfg,
        b: usize,
        mut state: Vec<Option<ExprRef<'a>>>,
    ) -> Result<Lifted<'a>, LiftError> {
        let lo = cfg.blocks[b].lo;
        let hi = cfg.blocks[b].hi;
        let block_start = self.insns[lo].offset;

        let mut stmts: Vec<Stmt<'a>> = Vec::new();
        let mut term: Option<Term<'a>> = None;
        // result of the preceding invoke / filled-new-array
        let mut pending: Option<ExprRef<'a>> = None;
        let mut pending_caught = self.handlers.get(&block_start).map(|&(_, expr)| expr);

        for index in lo..hi {
            let insn = self.insns[index].clone();
            let offset = insn.offset;

            // an unclaimed invoke result is a plain expression statement
            if !matches!(
                insn.opcode,
                Opcode::MoveResult | Opcode::MoveResultWide | Opcode::MoveResultObject
            ) {
                if let Some(expr) = pending.take() {
                    if matches!(expr, Expr::Invoke { .. }) {
                        stmts.push(Stmt::Expr(expr));
                    }
                }
            }

            // spill ahead of a closing branch so its condition reads the
            // same locals every successor will see
            if index == hi - 1
                && (matches!(insn.opcode, Opcode::PackedSwitch | Opcode::SparseSwitch)
                    || (Opcode::IfEq.value()..=Opcode::IfLez.value())
                        .contains(&insn.opcode.value()))
            {
                self.flush(&mut state, &mut stmts);
            }

            match insn.opcode {
                Opcode::Nop => {}

                Opcode::Move
                | Opcode::MoveFrom16
                | Opcode::Move16
                | Opcode::MoveObject
                | Opcode::MoveObjectFrom16
                | Opcode::MoveObject16 => {
                    let (a, src) = pair_regs(&insn);
                    let value = self.read(&state, src, offset)?;
                    self.write(&mut state, a, value, false);
                }
                Opcode::MoveWide | Opcode::MoveWideFrom16 | Opcode::MoveWide16 => {
                    let (a, src) = pair_regs(&insn);
                    let value = self.read(&state, src, offset)?;
                    self.write(&mut state, a, value, true);
                }

                Opcode::MoveResult | Opcode::MoveResultWide | Opcode::MoveResultObject => {
                    let a = reg_a(&insn);
                    let value = pending
                        .take()
                        .ok_or_else(|| self.error(offset, "move-result without a result"))?;
                    // the call result lands in its local right here, so
                    // calls keep their instruction order
                    let ty = value.java_type();
                    self.declare(a, ty);
                    stmts.push(Stmt::Assign {
                        target: self.arena.alloc(Expr::Local(a)),
                        value,
                    });
                    let local = self.arena.alloc(Expr::Local(a));
                    self.write(
                        &mut state,
                        a,
                        local,
                        insn.opcode == Opcode::MoveResultWide,
                    );
                }
                Opcode::MoveException => {
                    let a = reg_a(&insn);
                    let caught = pending_caught
                        .take()
                        .ok_or_else(|| self.error(offset, "move-exception outside a handler"))?;
                    self.write(&mut state, a, caught, false);
                }

                Opcode::ReturnVoid => term = Some(Term::Return(None)),
                Opcode::Return | Opcode::ReturnWide | Opcode::ReturnObject => {
                    let value = self.read(&state, reg_a(&insn), offset)?;
                    term = Some(Term::Return(Some(value)));
                }
                Opcode::Throw => {
                    let value = self.read(&state, reg_a(&insn), offset)?;
                    term = Some(Term::Throw(value));
                }

                Opcode::Const4 | Opcode::Const16 | Opcode::Const | Opcode::ConstHigh16 => {
                    let (a, value) = lit_operands(&insn);
                    let expr = self.arena.alloc(Expr::Int(value));
                    self.write(&mut state, a, expr, false);
                }
                Opcode::ConstWide16
                | Opcode::ConstWide32
                | Opcode::ConstWide
                | Opcode::ConstWideHigh16 => {
                    let (a, value) = lit_operands(&insn);
                    let expr = self.arena.alloc(Expr::Long(value));
                    self.write(&mut state, a, expr, true);
                }
                Opcode::ConstString | Opcode::ConstStringJumbo => {
                    let (a, index) = index_operands(&insn);
                    let text = self
                        .dex
                        .string(index)
                        .map_err(|e| self.error(offset, e.to_string()))?;
                    let interned = self.arena.alloc_str(&text);
                    let expr = self.arena.alloc(Expr::Str(interned));
                    self.write(&mut state, a, expr, false);
                }
                Opcode::ConstClass => {
                    let (a, index) = index_operands(&insn);
                    let ty = self.pretty(index, offset)?;
                    let expr = self.arena.alloc(Expr::ClassLit(ty));
                    self.write(&mut state, a, expr, false);
                }

                Opcode::MonitorEnter => {
                    let value = self.read(&state, reg_a(&insn), offset)?;
                    stmts.push(Stmt::MonitorEnter(value));
                }
                Opcode::MonitorExit => {
                    let value = self.read(&state, reg_a(&insn), offset)?;
                    stmts.push(Stmt::MonitorExit(value));
                }

                Opcode::CheckCast => {
                    let (a, index) = index_operands(&insn);
                    let ty = self.pretty(index, offset)?;
                    let operand = self.read(&state, a, offset)?;
                    let expr = self.arena.alloc(Expr::Cast { ty, operand });
                    self.write(&mut state, a, expr, false);
                }
                Opcode::InstanceOf => {
                    let (a, b_reg, index) = pair_index_operands(&insn);
                    let ty = self.pretty(index, offset)?;
                    let operand = self.read(&state, b_reg, offset)?;
                    let expr = self.arena.alloc(Expr::InstanceOf { ty, operand });
                    self.write(&mut state, a, expr, false);
                }
                Opcode::ArrayLength => {
                    let (a, src) = pair_regs(&insn);
                    let array = self.read(&state, src, offset)?;
                    let expr = self.arena.alloc(Expr::ArrayLength(array));
                    self.write(&mut state, a, expr, false);
                }

                Opcode::NewInstance => {
                    let (a, index) = index_operands(&insn);
                    let ty = self.pretty(index, offset)?;
                    let expr = self.arena.alloc(Expr::NewInstance { ty });
                    self.write(&mut state, a, expr, false);
                }
                Opcode::NewArray => {
                    let (a, size_reg, index) = pair_index_operands(&insn);
                    let ty = self.pretty(index, offset)?;
                    let size = self.read(&state, size_reg, offset)?;
                    let expr = self.arena.alloc(Expr::NewArray { ty, size });
                    self.write(&mut state, a, expr, false);
                }
                Opcode::FilledNewArray | Opcode::FilledNewArrayRange => {
                    let (args, index) = call_operands(&insn);
                    let ty = self.pretty(index, offset)?;
                    let mut values = Vec::with_capacity(args.len());
                    for reg in args {
                        values.push(self.read(&state, reg, offset)?);
                    }
                    let values = &*self.arena.alloc_slice_copy(&values);
                    pending = Some(self.arena.alloc(Expr::ArrayInit { ty, values }));
                }
                Opcode::FillArrayData => {
                    self.fill_array(&mut state, &mut stmts, &insn, offset)?;
                }

                Opcode::Goto | Opcode::Goto16 | Opcode::Goto32 => {
                    let target = branch_target(&insn);
                    term = Some(Term::Goto(self.block_of(cfg, target, offset)?));
                }
                Opcode::PackedSwitch | Opcode::SparseSwitch => {
                    let Operands::Switch {
                        a, keys, targets, ..
                    } = &insn.operands
                    else {
                        return Err(self.error(offset, "switch without payload"));
                    };
                    let scrutinee = self.read(&state, *a, offset)?;
                    // group keys that share a target into one case
                    let mut cases: Vec<(Vec<i32>, usize)> = Vec::new();
                    for (key, target) in keys.iter().zip(targets) {
                        let block = self.block_of(cfg, *target, offset)?;
                        match cases.iter_mut().find(|(_, b)| *b == block) {
                            Some((keys, _)) => keys.push(*key),
                            None => cases.push((vec![*key], block)),
                        }
                    }
                    let fall = insn.offset + insn.opcode.format().units();
                    let default = self.block_of(cfg, fall, offset)?;
                    term = Some(Term::Switch {
                        scrutinee,
                        cases,
                        default,
                    });
                }

                Opcode::CmplFloat | Opcode::CmplDouble => {
                    self.lift_cmp(&mut state, &insn, CmpBias::Less, offset)?;
                }
                Opcode::CmpgFloat | Opcode::CmpgDouble => {
                    self.lift_cmp(&mut state, &insn, CmpBias::Greater, offset)?;
                }
                Opcode::CmpLong => {
                    self.lift_cmp(&mut state, &insn, CmpBias::None, offset)?;
                }

                Opcode::IfEq
                | Opcode::IfNe
                | Opcode::IfLt
                | Opcode::IfGe
                | Opcode::IfGt
                | Opcode::IfLe => {
                    let Operands::PairBranch { a, b: b_reg, target } = &insn.operands else {
                        return Err(self.error(offset, "malformed if"));
                    };
                    let (a, b_reg, target) = (*a, *b_reg, *target);
                    let lhs = self.read(&state, a, offset)?;
                    let rhs = self.read(&state, b_reg, offset)?;
                    term = Some(self.branch_term(
                        cfg,
                        &insn,
                        rel_of(insn.opcode),
                        lhs,
                        rhs,
                        target,
                        offset,
                    )?);
                }
                Opcode::IfEqz
                | Opcode::IfNez
                | Opcode::IfLtz
                | Opcode::IfGez
                | Opcode::IfGtz
                | Opcode::IfLez => {
                    let Operands::RegBranch { a, target } = &insn.operands else {
                        return Err(self.error(offset, "malformed if"));
                    };
                    let (a, target) = (*a, *target);
                    let lhs = self.read(&state, a, offset)?;
                    let rhs = self.arena.alloc(Expr::Int(0));
                    term = Some(self.branch_term(
                        cfg,
                        &insn,
                        rel_of(insn.opcode),
                        lhs,
                        rhs,
                        target,
                        offset,
                    )?);
                }

                op if is_aget(op) => {
                    let (a, arr, idx) = triple_regs(&insn);
                    let array = self.read(&state, arr, offset)?;
                    let index = self.read(&state, idx, offset)?;
                    let expr = self.arena.alloc(Expr::ArrayGet { array, index });
                    self.write(&mut state, a, expr, op == Opcode::AgetWide);
                }
                op if is_aput(op) => {
                    let (a, arr, idx) = triple_regs(&insn);
                    let array = self.read(&state, arr, offset)?;
                    let index = self.read(&state, idx, offset)?;
                    let value = self.read(&state, a, offset)?;
                    let target = self.arena.alloc(Expr::ArrayGet { array, index });
                    stmts.push(Stmt::Assign { target, value });
                }

                op if is_iget(op) => {
                    let (a, obj, index) = pair_index_operands(&insn);
                    let object = self.read(&state, obj, offset)?;
                    let expr = self.field_get(Some(object), index, offset)?;
                    self.write(&mut state, a, expr, op == Opcode::IgetWide);
                }
                op if is_iput(op) => {
                    let (a, obj, index) = pair_index_operands(&insn);
                    let object = self.read(&state, obj, offset)?;
                    let value = self.read(&state, a, offset)?;
                    let target = self.field_get(Some(object), index, offset)?;
                    stmts.push(Stmt::Assign { target, value });
                }
                op if is_sget(op) => {
                    let (a, index) = index_operands(&insn);
                    let expr = self.field_get(None, index, offset)?;
                    self.write(&mut state, a, expr, op == Opcode::SgetWide);
                }
                op if is_sput(op) => {
                    let (a, index) = index_operands(&insn);
                    let value = self.read(&state, a, offset)?;
                    let target = self.field_get(None, index, offset)?;
                    stmts.push(Stmt::Assign { target, value });
                }

                op if op.is_invoke() => {
                    if matches!(
                        op,
                        Opcode::InvokePolymorphic
                            | Opcode::InvokePolymorphicRange
                            | Opcode::InvokeCustom
                            | Opcode::InvokeCustomRange
                    ) {
                        return Err(self.error(offset, format!("unsupported {op}")));
                    }
                    pending = self.lift_invoke(&mut state, &mut stmts, &insn, offset)?;
                }

                op if (Opcode::NegInt.value()..=Opcode::IntToShort.value())
                    .contains(&op.value()) =>
                {
                    let (a, src) = pair_regs(&insn);
                    let operand = self.read(&state, src, offset)?;
                    let (expr, wide): (ExprRef<'a>, bool) = match op {
                        Opcode::NegInt | Opcode::NegFloat => {
                            (self.arena.alloc(Expr::Unary { op: UnOp::Neg, operand }), false)
                        }
                        Opcode::NegLong | Opcode::NegDouble => {
                            (self.arena.alloc(Expr::Unary { op: UnOp::Neg, operand }), true)
                        }
                        Opcode::NotInt => {
                            (self.arena.alloc(Expr::Unary { op: UnOp::Not, operand }), false)
                        }
                        Opcode::NotLong => {
                            (self.arena.alloc(Expr::Unary { op: UnOp::Not, operand }), true)
                        }
                        other => {
                            let (ty, wide) = convert_target(other);
                            (self.arena.alloc(Expr::Cast { ty, operand }), wide)
                        }
                    };
                    self.write(&mut state, a, expr, wide);
                }

                op if (Opcode::AddInt.value()..=Opcode::RemDouble.value())
                    .contains(&op.value()) =>
                {
                    let (a, lhs_reg, rhs_reg) = triple_regs(&insn);
                    let (bin, wide) = binop_23x(op);
                    let lhs = self.read(&state, lhs_reg, offset)?;
                    let rhs = self.read(&state, rhs_reg, offset)?;
                    let expr = fold_binary(self.arena, bin, wide, lhs, rhs);
                    self.write(&mut state, a, expr, wide);
                }
                op if (Opcode::AddInt2addr.value()..=Opcode::RemDouble2addr.value())
                    .contains(&op.value()) =>
                {
                    let (a, src) = pair_regs(&insn);
                    let (bin, wide) = binop_2addr(op);
                    let lhs = self.read(&state, a, offset)?;
                    let rhs = self.read(&state, src, offset)?;
                    let expr = fold_binary(self.arena, bin, wide, lhs, rhs);
                    self.write(&mut state, a, expr, wide);
                }
                op if (Opcode::AddIntLit16.value()..=Opcode::UshrIntLit8.value())
                    .contains(&op.value()) =>
                {
                    let Operands::PairLit { a, b: src, value } = &insn.operands else {
                        return Err(self.error(offset, "malformed literal binop"));
                    };
                    let (a, src, value) = (*a, *src, *value);
                    let bin = binop_lit(op);
                    let reg_expr = self.read(&state, src, offset)?;
                    let lit = self.arena.alloc(Expr::Int(i64::from(value)));
                    // rsub flips the operands: lit - vB
                    let expr = if matches!(op, Opcode::RsubInt | Opcode::RsubIntLit8) {
                        fold_binary(self.arena, BinOp::Sub, false, lit, reg_expr)
                    } else {
                        fold_binary(self.arena, bin, false, reg_expr, lit)
                    };
                    self.write(&mut state, a, expr, false);
                }

                op => return Err(self.error(offset, format!("unsupported {op}"))),
            }
        }

        if let Some(expr) = pending.take() {
            if matches!(expr, Expr::Invoke { .. }) {
                stmts.push(Stmt::Expr(expr));
            }
        }

        let term = term.unwrap_or(Term::Next);
        if self.should_flush(cfg, b, &term) {
            self.flush(&mut state, &mut stmts);
        }

        Ok(Lifted { stmts, term, state })
    }

    /// Spill modified registers to their locals so every successor path
    /// finds the value in the same place.
    fn flush(&mut self, state: &mut [Option<ExprRef<'a>>], stmts: &mut Vec<Stmt<'a>>) {
        let mut regs: Vec<u16> = self.written.iter().copied().collect();
        regs.sort_unstable();
        for reg in regs {
            let Some(expr) = state[reg as usize] else {
                continue;
            };
            if matches!(expr, Expr::Local(r) if *r == reg) {
                continue;
            }
            self.declare(reg, expr.java_type());
            stmts.push(Stmt::Assign {
                target: self.arena.alloc(Expr::Local(reg)),
                value: expr,
            });
            state[reg as usize] = Some(self.arena.alloc(Expr::Local(reg)));
        }
    }

    fn should_flush(&self, cfg: &Cfg, b: usize, term: &Term<'a>) -> bool {
        if self.try_blocks.contains(&b) {
            return true;
        }
        if matches!(term, Term::Return(_) | Term::Throw(_)) {
            return false;
        }
        let succs = &cfg.blocks[b].succs;
        if succs.len() != 1 {
            return true;
        }
        let succ = succs[0];
        cfg.blocks[succ].preds.len() > 1 || cfg.is_loop_header(succ)
    }

    fn branch_term(
        &mut self,
        cfg: &Cfg,
        insn: &Insn,
        op: RelOp,
        lhs: ExprRef<'a>,
        rhs: ExprRef<'a>,
        target: usize,
        offset: usize,
    ) -> Result<Term<'a>, LiftError> {
        let cond = self.arena.alloc(Expr::Rel { op, lhs, rhs });
        let fall = insn.offset + insn.opcode.format().units();
        Ok(Term::If {
            cond,
            then_block: self.block_of(cfg, target, offset)?,
            else_block: self.block_of(cfg, fall, offset)?,
        })
    }

    fn lift_cmp(
        &mut self,
        state: &mut Vec<Option<ExprRef<'a>>>,
        insn: &Insn,
        bias: CmpBias,
        offset: usize,
    ) -> Result<(), LiftError> {
        let (a, lhs_reg, rhs_reg) = triple_regs(insn);
        let lhs = self.read(state, lhs_reg, offset)?;
        let rhs = self.read(state, rhs_reg, offset)?;
        let expr = self.arena.alloc(Expr::Cmp { bias, lhs, rhs });
        self.write(state, a, expr, false);
        Ok(())
    }

    fn lift_invoke(
        &mut self,
        state: &mut Vec<Option<ExprRef<'a>>>,
        stmts: &mut Vec<Stmt<'a>>,
        insn: &Insn,
        offset: usize,
    ) -> Result<Option<ExprRef<'a>>, LiftError> {
        let (arg_regs, index) = call_operands(insn);
        let item = self
            .dex
            .method(index)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let name = self
            .dex
            .string(item.name_idx)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let class_desc = item
            .class(self.dex)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let class: &'a str = self.arena.alloc_str(&pretty_type(&class_desc));
        let proto = item
            .proto(self.dex)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let ret_desc = proto
            .return_type(self.dex)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let ret: &'a str = self.arena.alloc_str(&pretty_type(&ret_desc));

        let target = match insn.opcode {
            Opcode::InvokeVirtual | Opcode::InvokeVirtualRange => InvokeTarget::Virtual,
            Opcode::InvokeSuper | Opcode::InvokeSuperRange => InvokeTarget::Super,
            Opcode::InvokeDirect | Opcode::InvokeDirectRange => InvokeTarget::Direct,
            Opcode::InvokeStatic | Opcode::InvokeStaticRange => InvokeTarget::Static,
            _ => InvokeTarget::Interface,
        };

        let is_static = matches!(target, InvokeTarget::Static);
        let mut regs = arg_regs.into_iter();
        let (object, object_reg) = if is_static {
            (None, None)
        } else {
            let reg = regs
                .next()
                .ok_or_else(|| self.error(offset, "instance call without receiver"))?;
            (Some(self.read(state, reg, offset)?), Some(reg))
        };

        // wide parameters occupy a register pair
        let mut args = Vec::new();
        let param_types = proto
            .parameters(self.dex)
            .map_err(|e| self.error(offset, e.to_string()))?;
        for type_idx in param_types {
            let descriptor = self
                .dex
                .type_descriptor(type_idx.into())
                .map_err(|e| self.error(offset, e.to_string()))?;
            let reg = regs
                .next()
                .ok_or_else(|| self.error(offset, "argument registers exhausted"))?;
            args.push(self.read(state, reg, offset)?);
            if matches!(&*descriptor, "J" | "D") {
                regs.next();
            }
        }
        let args = &*self.arena.alloc_slice_copy(&args);

        // new-instance + <init> collapses into a constructor call
        if matches!(target, InvokeTarget::Direct) && name == "<init>" {
            if let (Some(Expr::NewInstance { ty }), Some(obj_reg)) = (object, object_reg) {
                let ty = *ty;
                let value = self.arena.alloc(Expr::NewObject { ty, args });
                self.declare(obj_reg, ty);
                stmts.push(Stmt::Assign {
                    target: self.arena.alloc(Expr::Local(obj_reg)),
                    value,
                });
                let local = self.arena.alloc(Expr::Local(obj_reg));
                self.write(state, obj_reg, local, false);
                return Ok(None);
            }
        }

        let interned_name: &'a str = self.arena.alloc_str(&name);
        let invoke = self.arena.alloc(Expr::Invoke {
            target,
            object,
            class,
            name: interned_name,
            args,
            ret,
        });

        if ret == "void" {
            stmts.push(Stmt::Expr(invoke));
            Ok(None)
        } else {
            Ok(Some(invoke))
        }
    }

    fn fill_array(
        &mut self,
        state: &mut Vec<Option<ExprRef<'a>>>,
        stmts: &mut Vec<Stmt<'a>>,
        insn: &Insn,
        offset: usize,
    ) -> Result<(), LiftError> {
        let Operands::FillArray {
            a,
            element_width,
            data,
            ..
        } = &insn.operands
        else {
            return Err(self.error(offset, "fill-array-data without payload"));
        };

        let target_ty = match state[*a as usize] {
            Some(Expr::NewArray { ty, .. }) => *ty,
            _ => "int[]",
        };
        let element_ty = target_ty.strip_suffix("[]").unwrap_or("int");

        let mut values = Vec::new();
        for chunk in data.chunks(*element_width as usize) {
            let mut raw = 0u64;
            for (i, byte) in chunk.iter().enumerate() {
                raw |= u64::from(*byte) << (8 * i as u32);
            }
            let shift = 64 - 8 * chunk.len() as u32;
            let signed = ((raw << shift) as i64) >> shift;
            let value: ExprRef<'a> = match element_ty {
                "long" => self.arena.alloc(Expr::Long(signed)),
                "float" => self.arena.alloc(Expr::Float(f32::from_bits(raw as u32))),
                "double" => self.arena.alloc(Expr::Double(f64::from_bits(raw))),
                _ => self.arena.alloc(Expr::Int(signed)),
            };
            values.push(value);
        }
        let values = &*self.arena.alloc_slice_copy(&values);
        let init = self.arena.alloc(Expr::ArrayInit {
            ty: target_ty,
            values,
        });

        match state[*a as usize] {
            Some(expr) if matches!(expr, Expr::NewArray { .. }) => {
                self.write(state, *a, init, false);
            }
            Some(expr) if matches!(expr, Expr::Local(_) | Expr::Param(_)) => {
                stmts.push(Stmt::Assign {
                    target: expr,
                    value: init,
                });
            }
            _ => {
                log::debug!(
                    "{}: fill-array-data at {offset:#x} without a visible array",
                    self.method_name
                );
            }
        }
        Ok(())
    }

    fn field_get(
        &mut self,
        object: Option<ExprRef<'a>>,
        index: u32,
        offset: usize,
    ) -> Result<ExprRef<'a>, LiftError> {
        let item = self
            .dex
            .field(index)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let class_desc = item
            .class(self.dex)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let name = item
            .name(self.dex)
            .map_err(|e| self.error(offset, e.to_string()))?;
        let ty_desc = item
            .type_descriptor(self.dex)
            .map_err(|e| self.error(offset, e.to_string()))?;

        let class: &'a str = self.arena.alloc_str(&pretty_type(&class_desc));
        let name: &'a str = self.arena.alloc_str(&name);
        let ty: &'a str = self.arena.alloc_str(&pretty_type(&ty_desc));
        Ok(self.arena.alloc(Expr::FieldGet {
            object,
            class,
            name,
            ty,
        }))
    }

    fn pretty(&mut self, type_idx: u32, offset: usize) -> Result<&'a str, LiftError> {
        let descriptor = self
            .dex
            .type_descriptor(type_idx)
            .map_err(|e| self.error(offset, e.to_string()))?;
        Ok(self.arena.alloc_str(&pretty_type(&descriptor)))
    }

    fn block_of(&self, cfg: &Cfg, target: usize, offset: usize) -> Result<usize, LiftError> {
        let index = self
            .index_at
            .get(&target)
            .ok_or_else(|| self.error(offset, "branch into the middle of an instruction"))?;
        // the target is a leader by construction
        cfg.block_at
            .get(&self.insns[*index].offset)
            .copied()
            .ok_or_else(|| self.error(offset, "branch target outside any block"))
    }

    fn read(
        &self,
        state: &[Option<ExprRef<'a>>],
        reg: u16,
        offset: usize,
    ) -> Result<ExprRef<'a>, LiftError> {
        state
            .get(reg as usize)
            .copied()
            .flatten()
            .ok_or_else(|| self.error(offset, format!("read of undefined register v{reg}")))
    }

    fn write(
        &mut self,
        state: &mut [Option<ExprRef<'a>>],
        reg: u16,
        expr: ExprRef<'a>,
        wide: bool,
    ) {
        state[reg as usize] = Some(expr);
        if wide {
            if let Some(slot) = state.get_mut(reg as usize + 1) {
                *slot = None;
            }
        }
    }
}

fn flow_of(insn: &Insn) -> Flow {
    match insn.opcode {
        Opcode::Goto | Opcode::Goto16 | Opcode::Goto32 => match insn.operands {
            Operands::Branch { target } => Flow::Jump(target),
            _ => Flow::Halt,
        },
        op if (Opcode::IfEq.value()..=Opcode::IfLez.value()).contains(&op.value()) => {
            match insn.operands {
                Operands::RegBranch { target, .. } | Operands::PairBranch { target, .. } => {
                    Flow::Branch(target)
                }
                _ => Flow::Halt,
            }
        }
        Opcode::PackedSwitch | Opcode::SparseSwitch => match &insn.operands {
            Operands::Switch { targets, .. } => Flow::Switch {
                targets: targets.clone(),
                fall: true,
            },
            _ => Flow::Halt,
        },
        op if op.is_terminator() => Flow::Halt,
        Opcode::Throw => Flow::Halt,
        _ => Flow::Fall,
    }
}

/// Destination register of a register-writing instruction.
fn dest_of(insn: &Insn) -> Option<u16> {
    let value = insn.opcode.value();
    let writes = matches!(value, 0x01..=0x0d)           // moves
        || matches!(value, 0x12..=0x1c)                 // consts
        || matches!(value, 0x20..=0x23)                 // instance-of..new-array
        || value == 0x1f                                // check-cast
        || matches!(value, 0x2d..=0x31)                 // cmp
        || matches!(value, 0x44..=0x4a)                 // aget
        || matches!(value, 0x52..=0x58)                 // iget
        || matches!(value, 0x60..=0x66)                 // sget
        || matches!(value, 0x7b..=0xe2);                // unop/binop
    if !writes {
        return None;
    }
    match &insn.operands {
        Operands::Reg { a }
        | Operands::Pair { a, .. }
        | Operands::Triple { a, .. }
        | Operands::Lit { a, .. }
        | Operands::PairLit { a, .. }
        | Operands::Index { a, .. }
        | Operands::PairIndex { a, .. } => Some(*a),
        _ => None,
    }
}

fn reg_a(insn: &Insn) -> u16 {
    match &insn.operands {
        Operands::Reg { a }
        | Operands::Pair { a, .. }
        | Operands::Lit { a, .. }
        | Operands::Index { a, .. } => *a,
        _ => 0,
    }
}

fn pair_regs(insn: &Insn) -> (u16, u16) {
    match &insn.operands {
        Operands::Pair { a, b } => (*a, *b),
        _ => (0, 0),
    }
}

fn triple_regs(insn: &Insn) -> (u16, u16, u16) {
    match &insn.operands {
        Operands::Triple { a, b, c } => (*a, *b, *c),
        _ => (0, 0, 0),
    }
}

fn lit_operands(insn: &Insn) -> (u16, i64) {
    match &insn.operands {
        Operands::Lit { a, value } => (*a, *value),
        _ => (0, 0),
    }
}

fn index_operands(insn: &Insn) -> (u16, u32) {
    match &insn.operands {
        Operands::Index { a, index } => (*a, *index),
        _ => (0, 0),
    }
}

fn pair_index_operands(insn: &Insn) -> (u16, u16, u32) {
    match &insn.operands {
        Operands::PairIndex { a, b, index } => (*a, *b, *index),
        _ => (0, 0, 0),
    }
}

fn branch_target(insn: &Insn) -> usize {
    match &insn.operands {
        Operands::Branch { target } => *target,
        _ => 0,
    }
}

fn call_operands(insn: &Insn) -> (Vec<u16>, u32) {
    match &insn.operands {
        Operands::Call { args, index } => (args.to_vec(), *index),
        Operands::CallRange {
            first,
            count,
            index,
        } => ((*first..*first + *count).collect(), *index),
        _ => (Vec::new(), 0),
    }
}

fn rel_of(opcode: Opcode) -> RelOp {
    match opcode {
        Opcode::IfEq | Opcode::IfEqz => RelOp::Eq,
        Opcode::IfNe | Opcode::IfNez => RelOp::Ne,
        Opcode::IfLt | Opcode::IfLtz => RelOp::Lt,
        Opcode::IfGe | Opcode::IfGez => RelOp::Ge,
        Opcode::IfGt | Opcode::IfGtz => RelOp::Gt,
        _ => RelOp::Le,
    }
}

fn is_aget(op: Opcode) -> bool {
    (Opcode::Aget.value()..=Opcode::AgetShort.value()).contains(&op.value())
}

fn is_aput(op: Opcode) -> bool {
    (Opcode::Aput.value()..=Opcode::AputShort.value()).contains(&op.value())
}

fn is_iget(op: Opcode) -> bool {
    (Opcode::Iget.value()..=Opcode::IgetShort.value()).contains(&op.value())
}

fn is_iput(op: Opcode) -> bool {
    (Opcode::Iput.value()..=Opcode::IputShort.value()).contains(&op.value())
}

fn is_sget(op: Opcode) -> bool {
    (Opcode::Sget.value()..=Opcode::SgetShort.value()).contains(&op.value())
}

fn is_sput(op: Opcode) -> bool {
    (Opcode::Sput.value()..=Opcode::SputShort.value()).contains(&op.value())
}

/// (target type, wide) of the primitive conversion opcodes.
fn convert_target(op: Opcode) -> (&'static str, bool) {
    match op {
        Opcode::IntToLong | Opcode::FloatToLong | Opcode::DoubleToLong => ("long", true),
        Opcode::IntToDouble | Opcode::LongToDouble | Opcode::FloatToDouble => ("double", true),
        Opcode::IntToFloat | Opcode::LongToFloat | Opcode::DoubleToFloat => ("float", false),
        Opcode::LongToInt | Opcode::FloatToInt | Opcode::DoubleToInt => ("int", false),
        Opcode::IntToByte => ("byte", false),
        Opcode::IntToChar => ("char", false),
        _ => ("short", false),
    }
}

fn binop_23x(op: Opcode) -> (BinOp, bool) {
    let value = op.value();
    let (base, wide) = if value >= Opcode::AddDouble.value() {
        (Opcode::AddDouble.value(), true)
    } else if value >= Opcode::AddFloat.value() {
        (Opcode::AddFloat.value(), false)
    } else if value >= Opcode::AddLong.value() {
        (Opcode::AddLong.value(), true)
    } else {
        (Opcode::AddInt.value(), false)
    };
    (int_binop(value - base), wide)
}

fn binop_2addr(op: Opcode) -> (BinOp, bool) {
    let value = op.value();
    let (base, wide) = if value >= Opcode::AddDouble2addr.value() {
        (Opcode::AddDouble2addr.value(), true)
    } else if value >= Opcode::AddFloat2addr.value() {
        (Opcode::AddFloat2addr.value(), false)
    } else if value >= Opcode::AddLong2addr.value() {
        (Opcode::AddLong2addr.value(), true)
    } else {
        (Opcode::AddInt2addr.value(), false)
    };
    (int_binop(value - base), wide)
}

fn binop_lit(op: Opcode) -> BinOp {
    let value = op.value();
    if value <= Opcode::XorIntLit16.value() {
        // lit16 order: add, rsub, mul, div, rem, and, or, xor
        match value - Opcode::AddIntLit16.value() {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            2 => BinOp::Mul,
            3 => BinOp::Div,
            4 => BinOp::Rem,
            5 => BinOp::And,
            6 => BinOp::Or,
            _ => BinOp::Xor,
        }
    } else {
        match value - Opcode::AddIntLit8.value() {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            2 => BinOp::Mul,
            3 => BinOp::Div,
            4 => BinOp::Rem,
            5 => BinOp::And,
            6 => BinOp::Or,
            7 => BinOp::Xor,
            8 => BinOp::Shl,
            9 => BinOp::Shr,
            _ => BinOp::Ushr,
        }
    }
}

/// add, sub, mul, div, rem, and, or, xor, shl, shr, ushr
fn int_binop(rel: u8) -> BinOp {
    match rel {
        0 => BinOp::Add,
        1 => BinOp::Sub,
        2 => BinOp::Mul,
        3 => BinOp::Div,
        4 => BinOp::Rem,
        5 => BinOp::And,
        6 => BinOp::Or,
        7 => BinOp::Xor,
        8 => BinOp::Shl,
        9 => BinOp::Shr,
        _ => BinOp::Ushr,
    }
}
