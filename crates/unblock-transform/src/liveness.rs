// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Live locals across suspension points.
//!
//! A local must be saved at a suspension when it is used on some path
//! after the resumption (exception edges included) and may have been
//! assigned on some path before it. Operand-stack values are never saved;
//! the placement contract guarantees the stack holds only the future.

use std::collections::{BTreeMap, BTreeSet};

use unblock_ir::{LocalId, Method, Type};

use crate::cfg::{Cfg, NodeId};

/// Locals saved across one suspension, with their static types. Iteration
/// order is slot order in the saved frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSet {
    slots: BTreeMap<LocalId, Type>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, local: LocalId, ty: Type) {
        self.slots.insert(local, ty);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, local: LocalId) -> bool {
        self.slots.contains_key(&local)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalId, &Type)> {
        self.slots.iter().map(|(l, t)| (*l, t))
    }

    pub fn locals(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.slots.keys().copied()
    }

    /// Frame slot assigned to `local`.
    pub fn slot_of(&self, local: LocalId) -> Option<u32> {
        self.slots.keys().position(|l| *l == local).map(|i| i as u32)
    }
}

pub struct Liveness {
    live_in: Vec<BTreeSet<LocalId>>,
    defined_out: Vec<BTreeSet<LocalId>>,
}

impl Liveness {
    pub fn analyze(cfg: &Cfg, method: &Method, reachable: &BTreeSet<NodeId>) -> Self {
        let live_in = backward_liveness(cfg, reachable);
        let defined_out = maybe_defined(cfg, method, reachable);
        Self {
            live_in,
            defined_out,
        }
    }

    pub fn live_in(&self, node: NodeId) -> &BTreeSet<LocalId> {
        &self.live_in[node.0 as usize]
    }

    /// Locals to save when `suspend` parks and `resume` continues.
    pub fn live_across(
        &self,
        cfg: &Cfg,
        method: &Method,
        suspend: NodeId,
        resume: NodeId,
    ) -> LiveSet {
        let mut needed = self.live_in(resume).clone();
        needed.extend(exceptional_live(cfg, &self.live_in, resume));

        let defined = &self.defined_out[suspend.0 as usize];
        let mut set = LiveSet::new();
        for local in needed.intersection(defined) {
            set.insert(*local, method.local_ty(*local));
        }
        set
    }
}

fn exceptional_live(cfg: &Cfg, live_in: &[BTreeSet<LocalId>], node: NodeId) -> BTreeSet<LocalId> {
    let mut live = BTreeSet::new();
    for h in cfg.handlers_of(node) {
        live.extend(live_in[h.0 as usize].iter().copied());
    }
    live
}

fn backward_liveness(cfg: &Cfg, reachable: &BTreeSet<NodeId>) -> Vec<BTreeSet<LocalId>> {
    let mut live_in: Vec<BTreeSet<LocalId>> = vec![BTreeSet::new(); cfg.nodes.len()];
    let order: Vec<NodeId> = reachable.iter().rev().copied().collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &id in &order {
            let node = cfg.node(id);
            let exc = exceptional_live(cfg, &live_in, id);

            let mut live = exc.clone();
            for succ in node.successors() {
                live.extend(live_in[succ.0 as usize].iter().copied());
            }
            for instr in node.instrs.iter().rev() {
                if let Some(def) = instr.defined_local() {
                    live.remove(&def);
                }
                if instr.may_throw() {
                    live.extend(exc.iter().copied());
                }
                if let Some(used) = instr.used_local() {
                    live.insert(used);
                }
            }

            if live != live_in[id.0 as usize] {
                live_in[id.0 as usize] = live;
                changed = true;
            }
        }
    }
    live_in
}

fn maybe_defined(cfg: &Cfg, method: &Method, reachable: &BTreeSet<NodeId>) -> Vec<BTreeSet<LocalId>> {
    let mut defined_in: Vec<BTreeSet<LocalId>> = vec![BTreeSet::new(); cfg.nodes.len()];
    let mut defined_out: Vec<BTreeSet<LocalId>> = vec![BTreeSet::new(); cfg.nodes.len()];
    defined_in[cfg.entry.0 as usize] = method.params.iter().map(|p| p.id).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &id in reachable {
            let node = cfg.node(id);
            let mut out = defined_in[id.0 as usize].clone();
            out.extend(node.instrs.iter().filter_map(|i| i.defined_local()));

            let targets = node.successors().into_iter().chain(cfg.handlers_of(id));
            for target in targets.collect::<Vec<_>>() {
                let incoming = &mut defined_in[target.0 as usize];
                let before = incoming.len();
                incoming.extend(out.iter().copied());
                changed |= incoming.len() != before;
            }
            if out != defined_out[id.0 as usize] {
                defined_out[id.0 as usize] = out;
                changed = true;
            }
        }
    }
    defined_out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow;
    use crate::{MethodCtx, TransformOptions};
    use unblock_ir::{BinOp, Const, FunctionRef, Instr, MethodBuilder, Terminator};

    fn await_int() -> Instr {
        Instr::Invoke {
            func: FunctionRef::new("Await.await", 1, Type::Int),
        }
    }

    fn live_at_first_suspend(m: &Method) -> LiveSet {
        let options = TransformOptions::default();
        let ctx = MethodCtx::new("T.m", &options);
        let cfg = Cfg::build(m, &ctx);
        let facts = flow::check(&cfg, &m.ret_ty, &ctx).expect("flow ok");
        let liveness = Liveness::analyze(&cfg, m, &facts.reachable);
        let node = cfg
            .nodes
            .iter()
            .find(|n| n.is_suspend())
            .expect("has a suspend");
        let resume = node.successors()[0];
        liveness.live_across(&cfg, m, node.id, resume)
    }

    #[test]
    fn dead_and_undefined_locals_are_not_saved() {
        // a = 1; b = 2; x = await(f); return a + x   (b dead, c assigned later)
        let mut b = MethodBuilder::new("m", Type::Int);
        let f = b.add_param("f", Type::Future);
        let a = b.alloc_local("a", Type::Int);
        let dead = b.alloc_local("b", Type::Int);
        let x = b.alloc_local("x", Type::Int);
        b.push_all([
            Instr::Push(Const::Int(1)),
            Instr::Store(a),
            Instr::Push(Const::Int(2)),
            Instr::Store(dead),
            Instr::Load(f),
            await_int(),
            Instr::Store(x),
            Instr::Load(a),
            Instr::Load(x),
            Instr::Binary(BinOp::Add),
        ]);
        b.terminate(Terminator::Return);
        let live = live_at_first_suspend(&b.finish());

        assert_eq!(live.locals().collect::<Vec<_>>(), vec![a]);
        assert_eq!(live.slot_of(a), Some(0));
        assert!(!live.contains(dead));
        assert!(!live.contains(x));
    }

    #[test]
    fn loop_induction_variable_is_saved() {
        // i = 0; loop: if i < 3 { await(f); i = i + 1; goto loop } return
        let mut b = MethodBuilder::new("m", Type::Void);
        let f = b.add_param("f", Type::Future);
        let i = b.alloc_local("i", Type::Int);
        let head = b.create_block();
        let body = b.create_block();
        let exit = b.create_block();
        b.push_all([Instr::Push(Const::Int(0)), Instr::Store(i)]);
        b.terminate(Terminator::Goto { target: head });
        b.switch_to_block(head);
        b.push_all([
            Instr::Load(i),
            Instr::Push(Const::Int(3)),
            Instr::Binary(BinOp::Lt),
        ]);
        b.terminate(Terminator::Branch {
            then_block: body,
            else_block: exit,
        });
        b.switch_to_block(body);
        b.push_all([
            Instr::Load(f),
            await_int(),
            Instr::Pop,
            Instr::Load(i),
            Instr::Push(Const::Int(1)),
            Instr::Binary(BinOp::Add),
            Instr::Store(i),
        ]);
        b.terminate(Terminator::Goto { target: head });
        b.switch_to_block(exit);
        b.terminate(Terminator::Return);
        let live = live_at_first_suspend(&b.finish());

        let saved: Vec<(LocalId, Type)> = live.iter().map(|(l, t)| (l, t.clone())).collect();
        assert_eq!(saved, vec![(f, Type::Future), (i, Type::Int)]);
    }

    #[test]
    fn handler_uses_keep_locals_alive() {
        // try { await(f) } catch { return fallback }
        let mut b = MethodBuilder::new("m", Type::Int);
        let f = b.add_param("f", Type::Future);
        let fallback = b.add_param("fallback", Type::Int);
        let body = b.create_block();
        let handler = b.create_block();
        b.terminate(Terminator::Goto { target: body });
        b.switch_to_block(body);
        b.push_all([Instr::Load(f), await_int()]);
        b.terminate(Terminator::Return);
        b.switch_to_block(handler);
        b.push_all([Instr::Pop, Instr::Load(fallback)]);
        b.terminate(Terminator::Return);
        b.add_region([body], handler, unblock_ir::RegionKind::CatchAll);
        let live = live_at_first_suspend(&b.finish());

        assert!(live.contains(fallback));
        assert!(!live.contains(f));
    }
}
