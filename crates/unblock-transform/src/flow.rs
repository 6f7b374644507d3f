// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Forward stack-depth and monitor-depth dataflow.
//!
//! Establishes the placement contract for suspend markers: the operand
//! stack holds exactly the awaited future and no monitor is held. Also
//! yields the set of reachable nodes, which bounds every later pass.

use std::collections::{BTreeSet, VecDeque};

use unblock_ir::{Instr, Terminator, Type};

use crate::cfg::{Cfg, Exit, NodeId};
use crate::{MethodCtx, TransformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlowState {
    stack: usize,
    monitors: u32,
}

/// Facts established by the flow check.
#[derive(Debug, Clone)]
pub struct FlowFacts {
    pub reachable: BTreeSet<NodeId>,
}

pub fn check(cfg: &Cfg, ret_ty: &Type, ctx: &MethodCtx<'_>) -> Result<FlowFacts, TransformError> {
    let mut states: Vec<Option<FlowState>> = vec![None; cfg.nodes.len()];
    let mut worklist = VecDeque::new();

    let entry = FlowState {
        stack: 0,
        monitors: 0,
    };
    states[cfg.entry.0 as usize] = Some(entry);
    worklist.push_back(cfg.entry);

    while let Some(id) = worklist.pop_front() {
        let Some(state) = states[id.0 as usize] else {
            continue;
        };
        let node = cfg.node(id);
        let mut out = Vec::new();
        let mut st = state;

        for (i, instr) in node.instrs.iter().enumerate() {
            let at = node.location(i);
            if instr.may_throw() {
                for h in cfg.handlers_of(id) {
                    out.push((h, handler_state(st), at));
                }
            }
            let (pops, pushes) = instr.stack_effect();
            if st.stack < pops {
                return Err(ctx.malformed(at, format!("stack underflow at `{}`", instr)));
            }
            st.stack = st.stack - pops + pushes;
            match instr {
                Instr::MonitorEnter => st.monitors += 1,
                Instr::MonitorExit => {
                    if st.monitors == 0 {
                        return Err(ctx.unbalanced(at, "monitor exit without a matching enter"));
                    }
                    st.monitors -= 1;
                }
                _ => {}
            }
        }

        let at = node.exit_location();
        match &node.exit {
            Exit::Suspend { marker, resume } => {
                for h in cfg.handlers_of(id) {
                    out.push((h, handler_state(st), at));
                }
                if st.stack != 1 {
                    return Err(TransformError::UnsupportedSuspensionPosition {
                        method: ctx.qualified.to_string(),
                        at,
                        detail: misplaced_operands(st.stack),
                    });
                }
                if st.monitors > 0 {
                    return Err(ctx.unbalanced(
                        at,
                        format!("suspends while holding {} monitor(s)", st.monitors),
                    ));
                }
                let after = FlowState {
                    stack: marker.ret.stack_slots(),
                    monitors: 0,
                };
                out.push((*resume, after, at));
            }
            Exit::Term(term) => {
                let pops = term.pops(ret_ty);
                if st.stack < pops {
                    return Err(ctx.malformed(at, format!("stack underflow at `{}`", term)));
                }
                match term {
                    Terminator::Throw => {
                        for h in cfg.handlers_of(id) {
                            out.push((h, handler_state(st), at));
                        }
                    }
                    Terminator::Return if st.monitors > 0 => {
                        return Err(ctx.unbalanced(
                            at,
                            format!("returns while holding {} monitor(s)", st.monitors),
                        ));
                    }
                    Terminator::EndFinally => {
                        return Err(ctx.malformed(at, "end_finally outside a finally body"));
                    }
                    _ => {}
                }
                let after = FlowState {
                    stack: st.stack - pops,
                    monitors: st.monitors,
                };
                for succ in node.successors() {
                    out.push((succ, after, at));
                }
            }
        }

        for (target, incoming, from) in out {
            match states[target.0 as usize] {
                None => {
                    states[target.0 as usize] = Some(incoming);
                    worklist.push_back(target);
                }
                Some(existing) if existing == incoming => {}
                Some(existing) => {
                    let origin = cfg.node(target).location(0);
                    if existing.stack != incoming.stack {
                        return Err(ctx.malformed(
                            from,
                            format!(
                                "stack depth {} meets {} at {}",
                                incoming.stack, existing.stack, origin
                            ),
                        ));
                    }
                    return Err(ctx.unbalanced(
                        from,
                        format!(
                            "{} monitor(s) held here but {} on another path into {}",
                            incoming.monitors, existing.monitors, origin
                        ),
                    ));
                }
            }
        }
    }

    let reachable = states
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_some())
        .map(|(i, _)| NodeId(i as u32))
        .collect();
    Ok(FlowFacts { reachable })
}

fn handler_state(st: FlowState) -> FlowState {
    FlowState {
        stack: 1,
        monitors: st.monitors,
    }
}

fn misplaced_operands(depth: usize) -> String {
    if depth == 0 {
        return "no future on the operand stack".to_string();
    }
    let extra = depth - 1;
    format!(
        "{} value{} beneath the awaited future",
        extra,
        if extra == 1 { "" } else { "s" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, TransformOptions};
    use unblock_ir::{BinOp, BlockId, Const, FunctionRef, Location, Method, MethodBuilder};

    fn await_int() -> Instr {
        Instr::Invoke {
            func: FunctionRef::new("Await.await", 1, Type::Int),
        }
    }

    fn run(m: &Method) -> Result<FlowFacts, TransformError> {
        let options = TransformOptions::default();
        let ctx = MethodCtx::new("T.m", &options);
        let cfg = Cfg::build(m, &ctx);
        check(&cfg, &m.ret_ty, &ctx)
    }

    #[test]
    fn value_beneath_future_is_unsupported() {
        // 1 + await(f)
        let mut b = MethodBuilder::new("m", Type::Int);
        let f = b.add_param("f", Type::Future);
        b.push_all([
            Instr::Push(Const::Int(1)),
            Instr::Load(f),
            await_int(),
            Instr::Binary(BinOp::Add),
        ]);
        b.terminate(Terminator::Return);
        let err = run(&b.finish()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedSuspensionPosition);
        assert_eq!(err.location(), Location::new(BlockId(0), 2));
        assert_eq!(err.detail(), "1 value beneath the awaited future");
    }

    #[test]
    fn await_inside_monitor_is_unbalanced() {
        let mut b = MethodBuilder::new("m", Type::Int);
        let lock = b.add_param("lock", Type::object("Object"));
        let f = b.add_param("f", Type::Future);
        b.push_all([
            Instr::Load(lock),
            Instr::MonitorEnter,
            Instr::Load(f),
            await_int(),
            Instr::Load(lock),
            Instr::MonitorExit,
        ]);
        b.terminate(Terminator::Return);
        let err = run(&b.finish()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnbalancedSynchronizedRegion);
        assert_eq!(err.location(), Location::new(BlockId(0), 3));
    }

    #[test]
    fn monitor_released_before_await_is_fine() {
        let mut b = MethodBuilder::new("m", Type::Int);
        let lock = b.add_param("lock", Type::object("Object"));
        let f = b.add_param("f", Type::Future);
        b.push_all([
            Instr::Load(lock),
            Instr::MonitorEnter,
            Instr::Load(lock),
            Instr::MonitorExit,
            Instr::Load(f),
            await_int(),
        ]);
        b.terminate(Terminator::Return);
        let facts = run(&b.finish()).expect("accepted");
        assert_eq!(facts.reachable.len(), 2);
    }

    #[test]
    fn mismatched_merge_depth_is_malformed() {
        let mut b = MethodBuilder::new("m", Type::Void);
        let c = b.add_param("c", Type::Bool);
        let left = b.create_block();
        let right = b.create_block();
        let join = b.create_block();
        b.push(Instr::Load(c));
        b.terminate(Terminator::Branch {
            then_block: left,
            else_block: right,
        });
        b.switch_to_block(left);
        b.push(Instr::Push(Const::Int(1)));
        b.terminate(Terminator::Goto { target: join });
        b.switch_to_block(right);
        b.terminate(Terminator::Goto { target: join });
        b.switch_to_block(join);
        b.terminate(Terminator::Return);
        let err = run(&b.finish()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedCode);
    }

    #[test]
    fn underflow_is_malformed() {
        let mut b = MethodBuilder::new("m", Type::Void);
        b.push(Instr::Pop);
        b.terminate(Terminator::Return);
        let err = run(&b.finish()).unwrap_err();
        assert_eq!(err.location(), Location::new(BlockId(0), 0));
    }
}
