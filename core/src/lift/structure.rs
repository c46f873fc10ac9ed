//! Structured control-flow recovery over a lifted CFG.
//!
//! Interval-style reconstruction: natural loops become `while`/`do-while`,
//! two-way branches become `if`/`else` matched at the immediate
//! post-dominator, switches get one region per case. Anything that resists
//! structuring degrades to a synthetic label and `goto`.

use ahash::{AHashMap, AHashSet};
use bumpalo::Bump;

use crate::expr::{same_place, Catch, Expr, ExprRef, RelOp, Stmt};
use crate::lift::blocks::Cfg;

/// Block terminator produced by the symbolic executors.
#[derive(Debug)]
pub(crate) enum Term<'a> {
    /// Falls through to the single successor.
    Next,
    Goto(usize),
    /// `cond` true jumps to `then_block`, false to `else_block`.
    If {
        cond: ExprRef<'a>,
        then_block: usize,
        else_block: usize,
    },
    Switch {
        scrutinee: ExprRef<'a>,
        cases: Vec<(Vec<i32>, usize)>,
        default: usize,
    },
    Return(Option<ExprRef<'a>>),
    Throw(ExprRef<'a>),
}

/// One guarded range, in block space.
#[derive(Debug)]
pub(crate) struct TrySpan {
    /// Block that opens the range.
    pub start_block: usize,
    /// First block past the range, when the range does not run to the end.
    pub cont_block: Option<usize>,
    /// (pretty type or None for catch-all, exception var, handler block)
    pub catches: Vec<(Option<String>, u16, usize)>,
}

pub(crate) struct Structurer<'a, 'c> {
    arena: &'a Bump,
    cfg: &'c Cfg,
    block_offset: Vec<usize>,
    /// label offset → block, the inverse of `block_offset`
    block_of_label: AHashMap<usize, usize>,
    stmts: Vec<Vec<Stmt<'a>>>,
    terms: Vec<Option<Term<'a>>>,
    tries: Vec<TrySpan>,
    try_done: Vec<bool>,
    emitted: Vec<bool>,
    need_label: AHashSet<usize>,
    /// (header block, exit block) of the innermost active loop
    loop_stack: Vec<(usize, Option<usize>)>,
}

impl<'a, 'c> Structurer<'a, 'c> {
    pub(crate) fn run(
        arena: &'a Bump,
        cfg: &'c Cfg,
        block_offset: Vec<usize>,
        stmts: Vec<Vec<Stmt<'a>>>,
        terms: Vec<Term<'a>>,
        tries: Vec<TrySpan>,
    ) -> Vec<Stmt<'a>> {
        let try_count = tries.len();
        let block_count = cfg.blocks.len();
        let block_of_label: AHashMap<usize, usize> = block_offset
            .iter()
            .enumerate()
            .map(|(b, &offset)| (offset, b))
            .collect();
        let mut structurer = Structurer {
            arena,
            cfg,
            block_offset,
            block_of_label,
            stmts,
            terms: terms.into_iter().map(Some).collect(),
            tries,
            try_done: vec![false; try_count],
            emitted: vec![false; block_count],
            need_label: AHashSet::new(),
            loop_stack: Vec::new(),
        };

        let mut out = Vec::new();
        structurer.emit_chain(Some(0), None, &mut out);

        // goto targets that were never reached through structured regions:
        // emit them as labeled tails until the set closes
        loop {
            let pending: Vec<usize> = structurer
                .need_label
                .iter()
                .filter_map(|off| structurer.block_of_label.get(off).copied())
                .filter(|&b| !structurer.emitted[b])
                .collect();
            if pending.is_empty() {
                break;
            }
            for b in pending {
                if !structurer.emitted[b] {
                    structurer.emit_chain(Some(b), None, &mut out);
                }
            }
        }

        let needed = structurer.need_label;
        prune_labels(&mut out, &needed);
        out
    }

    fn emit_chain(&mut self, mut cur: Option<usize>, stop: Option<usize>, out: &mut Vec<Stmt<'a>>) {
        while let Some(b) = cur {
            if Some(b) == stop {
                return;
            }
            if let Some(jump) = self.loop_jump(b) {
                out.push(jump);
                return;
            }
            if self.emitted[b] {
                let offset = self.block_offset[b];
                self.need_label.insert(offset);
                out.push(Stmt::Goto(offset));
                return;
            }
            if let Some(try_index) = self.try_starting_at(b) {
                cur = self.emit_try(try_index, out);
                continue;
            }
            if self.cfg.is_loop_header(b) {
                cur = self.emit_loop(b, out);
                continue;
            }
            cur = self.emit_block(b, out);
        }
    }

    /// `continue`/`break` for jumps back to the innermost header or out to
    /// its exit.
    fn loop_jump(&self, b: usize) -> Option<Stmt<'a>> {
        let &(header, exit) = self.loop_stack.last()?;
        if b == header {
            return Some(Stmt::Continue);
        }
        if exit == Some(b) {
            return Some(Stmt::Break);
        }
        None
    }

    fn try_starting_at(&self, b: usize) -> Option<usize> {
        (0..self.tries.len()).find(|&i| !self.try_done[i] && self.tries[i].start_block == b)
    }

    fn emit_try(&mut self, try_index: usize, out: &mut Vec<Stmt<'a>>) -> Option<usize> {
        self.try_done[try_index] = true;
        let start_block = self.tries[try_index].start_block;
        let cont = self.tries[try_index].cont_block;
        let catches_spec: Vec<(Option<String>, u16, usize)> =
            self.tries[try_index].catches.clone();

        let mut body = Vec::new();
        self.emit_chain(Some(start_block), cont, &mut body);

        let mut catches = Vec::new();
        for (ty, var, handler_block) in catches_spec {
            let mut handler_body = Vec::new();
            self.emit_chain(Some(handler_block), cont, &mut handler_body);
            catches.push(Catch {
                ty,
                var,
                body: handler_body,
            });
        }

        out.push(Stmt::TryCatch { body, catches });
        cont
    }

    fn emit_loop(&mut self, header: usize, out: &mut Vec<Stmt<'a>>) -> Option<usize> {
        self.emitted[header] = true;
        let body_set = self.cfg.natural_loop(header);
        let header_stmts = std::mem::take(&mut self.stmts[header]);
        let term = self.terms[header].take().expect("header term taken once");

        // while-form: an empty header whose branch leaves the loop
        if header_stmts.is_empty() {
            if let Term::If {
                cond,
                then_block,
                else_block,
            } = &term
            {
                let exits_then = !body_set.contains(then_block);
                let exits_else = !body_set.contains(else_block);
                if exits_then != exits_else {
                    let (exit, body_start, loop_cond) = if exits_then {
                        (*then_block, *else_block, negate(self.arena, *cond))
                    } else {
                        (*else_block, *then_block, *cond)
                    };

                    self.loop_stack.push((header, Some(exit)));
                    let mut body = Vec::new();
                    self.emit_chain(Some(body_start), Some(header), &mut body);
                    self.loop_stack.pop();
                    strip_trailing_continue(&mut body);

                    out.push(Stmt::While {
                        cond: loop_cond,
                        body,
                    });
                    return Some(exit);
                }
            }
        }

        // generic form: while (true) with breaks, reduced to do-while when
        // the body ends on a conditional continue
        let exit = self.cfg.ipdom[header].filter(|e| !body_set.contains(e));
        self.loop_stack.push((header, exit));
        let mut body = header_stmts;
        let next = self.emit_term(header, term, &mut body);
        self.emit_chain(next, Some(header), &mut body);
        self.loop_stack.pop();

        if let Some(Stmt::If {
            cond,
            then_body,
            else_body,
        }) = body.last()
        {
            if else_body.is_empty() && matches!(then_body.as_slice(), [Stmt::Continue]) {
                let cond = *cond;
                body.pop();
                out.push(Stmt::DoWhile { body, cond });
                return exit;
            }
        }
        strip_trailing_continue(&mut body);

        let always = self.arena.alloc(Expr::Int(1));
        out.push(Stmt::While { cond: always, body });
        exit
    }

    fn emit_block(&mut self, b: usize, out: &mut Vec<Stmt<'a>>) -> Option<usize> {
        self.emitted[b] = true;
        out.push(Stmt::Label(self.block_offset[b]));
        let mut stmts = std::mem::take(&mut self.stmts[b]);
        out.append(&mut stmts);
        let term = self.terms[b].take().expect("block term taken once");
        self.emit_term(b, term, out)
    }

    fn emit_term(
        &mut self,
        b: usize,
        term: Term<'a>,
        out: &mut Vec<Stmt<'a>>,
    ) -> Option<usize> {
        match term {
            Term::Next => self.cfg.blocks[b].succs.first().copied(),
            Term::Goto(target) => Some(target),
            Term::Return(value) => {
                out.push(Stmt::Return(value));
                None
            }
            Term::Throw(value) => {
                out.push(Stmt::Throw(value));
                None
            }
            Term::If {
                cond,
                then_block,
                else_block,
            } => {
                let join = self.cfg.ipdom[b];

                let mut then_body = Vec::new();
                self.emit_chain(Some(then_block), join, &mut then_body);
                let mut else_body = Vec::new();
                self.emit_chain(Some(else_block), join, &mut else_body);

                let (cond, then_body, else_body) = if then_body.is_empty() && !else_body.is_empty()
                {
                    (negate(self.arena, cond), else_body, then_body)
                } else {
                    (cond, then_body, else_body)
                };

                if !(then_body.is_empty() && else_body.is_empty()) {
                    out.push(Stmt::If {
                        cond,
                        then_body,
                        else_body,
                    });
                }
                join
            }
            Term::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let join = self.cfg.ipdom[b];

                let mut case_bodies = Vec::new();
                for (keys, target) in cases {
                    let mut body = Vec::new();
                    self.emit_chain(Some(target), join, &mut body);
                    if !ends_control(&body) {
                        body.push(Stmt::Break);
                    }
                    case_bodies.push((keys, body));
                }
                let mut default_body = Vec::new();
                self.emit_chain(Some(default), join, &mut default_body);

                out.push(Stmt::Switch {
                    scrutinee,
                    cases: case_bodies,
                    default: default_body,
                });
                join
            }
        }
    }
}

fn ends_control(body: &[Stmt<'_>]) -> bool {
    matches!(
        body.last(),
        Some(
            Stmt::Return(_)
                | Stmt::Throw(_)
                | Stmt::Goto(_)
                | Stmt::Break
                | Stmt::Continue
        )
    )
}

fn strip_trailing_continue(body: &mut Vec<Stmt<'_>>) {
    if matches!(body.last(), Some(Stmt::Continue)) {
        body.pop();
    }
}

/// Negate a condition; non-relational expressions compare against zero.
pub(crate) fn negate<'a>(arena: &'a Bump, cond: ExprRef<'a>) -> ExprRef<'a> {
    match cond {
        Expr::Rel { op, lhs, rhs } => arena.alloc(Expr::Rel {
            op: op.negate(),
            lhs,
            rhs,
        }),
        _ => {
            let zero = arena.alloc(Expr::Int(0));
            arena.alloc(Expr::Rel {
                op: RelOp::Eq,
                lhs: cond,
                rhs: zero,
            })
        }
    }
}

/// Drop synthetic labels nothing jumps to.
pub(crate) fn prune_labels(stmts: &mut Vec<Stmt<'_>>, needed: &AHashSet<usize>) {
    stmts.retain_mut(|stmt| match stmt {
        Stmt::Label(offset) => needed.contains(offset),
        _ => {
            for body in child_bodies(stmt) {
                prune_labels(body, needed);
            }
            true
        }
    });
}

fn child_bodies<'s, 'a>(stmt: &'s mut Stmt<'a>) -> Vec<&'s mut Vec<Stmt<'a>>> {
    match stmt {
        Stmt::If {
            then_body,
            else_body,
            ..
        } => vec![then_body, else_body],
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::Synchronized { body, .. } => {
            vec![body]
        }
        Stmt::Switch { cases, default, .. } => {
            let mut bodies: Vec<_> = cases.iter_mut().map(|(_, body)| body).collect();
            bodies.push(default);
            bodies
        }
        Stmt::TryCatch { body, catches } => {
            let mut bodies = vec![body];
            bodies.extend(catches.iter_mut().map(|catch| &mut catch.body));
            bodies
        }
        _ => Vec::new(),
    }
}

/// Recover `synchronized` regions from paired enter/exit statements.
///
/// All-or-nothing per method: when any enter lacks a same-level exit over
/// the same place, the original raw statements are kept.
pub(crate) fn pair_monitors<'a>(stmts: Vec<Stmt<'a>>) -> Vec<Stmt<'a>> {
    if !contains_monitor(&stmts) {
        return stmts;
    }
    let fallback = stmts.clone();
    match try_pair(stmts) {
        Some(paired) => paired,
        None => fallback,
    }
}

fn contains_monitor(stmts: &[Stmt<'_>]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::MonitorEnter(_) | Stmt::MonitorExit(_) => true,
        Stmt::If {
            then_body,
            else_body,
            ..
        } => contains_monitor(then_body) || contains_monitor(else_body),
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::Synchronized { body, .. } => contains_monitor(body),
        Stmt::Switch { cases, default, .. } => {
            cases.iter().any(|(_, body)| contains_monitor(body)) || contains_monitor(default)
        }
        Stmt::TryCatch { body, catches } => {
            contains_monitor(body) || catches.iter().any(|catch| contains_monitor(&catch.body))
        }
        _ => false,
    })
}

fn try_pair<'a>(stmts: Vec<Stmt<'a>>) -> Option<Vec<Stmt<'a>>> {
    let mut out: Vec<Stmt<'a>> = Vec::with_capacity(stmts.len());
    let mut iter = stmts.into_iter();

    while let Some(stmt) = iter.next() {
        match stmt {
            Stmt::MonitorEnter(monitor) => {
                let mut body = Vec::new();
                let mut closed = false;
                for inner in iter.by_ref() {
                    match &inner {
                        Stmt::MonitorExit(exit) if same_place(monitor, exit) => {
                            closed = true;
                            break;
                        }
                        _ => body.push(inner),
                    }
                }
                if !closed {
                    return None;
                }
                // exits duplicated on exceptional paths inside the region
                // collapse into the synchronized block
                body.retain(|inner| {
                    !matches!(inner, Stmt::MonitorExit(exit) if same_place(monitor, exit))
                });
                let body = try_pair(body)?;
                out.push(Stmt::Synchronized { monitor, body });
            }
            Stmt::MonitorExit(_) => return None,
            mut other => {
                for body in child_bodies(&mut other) {
                    let taken = std::mem::take(body);
                    *body = try_pair(taken)?;
                }
                out.push(other);
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_pairing_wraps_region() {
        let arena = Bump::new();
        let monitor: ExprRef<'_> = arena.alloc(Expr::Local(0));
        let body_stmt = Stmt::Return(None);
        let stmts = vec![
            Stmt::MonitorEnter(monitor),
            body_stmt,
            Stmt::MonitorExit(monitor),
        ];
        let paired = pair_monitors(stmts);
        assert_eq!(paired.len(), 1);
        assert!(matches!(&paired[0], Stmt::Synchronized { body, .. } if body.len() == 1));
    }

    #[test]
    fn unbalanced_monitors_stay_raw() {
        let arena = Bump::new();
        let monitor: ExprRef<'_> = arena.alloc(Expr::Local(0));
        let stmts = vec![Stmt::MonitorEnter(monitor), Stmt::Return(None)];
        let kept = pair_monitors(stmts);
        assert_eq!(kept.len(), 2);
        assert!(matches!(kept[0], Stmt::MonitorEnter(_)));
    }
}
