// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Continuation dispatcher synthesis.
//!
//! Emits `name$dispatch(__state, __resume, __frame) -> Future`:
//!
//! ```text
//! bb0:       outer = frame_outer __frame; switch __state [0: start, k: resume_k]
//! start:     restore params from the frame; goto <entry>
//! resume_k:  restore live locals; push unwrap(__resume); goto <after marker k>
//! <node>:    original instructions, locals remapped
//!   marker:  dup; future_is_done; if then fast_k else park_k
//! fast_k:    future_join; goto <after marker k>
//! park_k:    save live locals into a fresh frame; resume dispatch@k; return outer
//! return:    fulfill outer with the value; return outer
//! fail:      state 0 ? rethrow : reject outer and return it
//! ```
//!
//! A completed future is joined on the current call stack, so chains of
//! already-settled futures never leave the first dispatch call.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use unblock_ir::{
    BinOp, BlockId, Const, FunctionRef, Instr, LocalId, Method, MethodBuilder,
    MethodFlags, RegionKind, Terminator, Type,
};

use crate::cfg::{Cfg, Exit, NodeId};
use crate::regions::RegionPiece;
use crate::segment::Segmentation;
use crate::suspend::SuspensionPoint;
use crate::MethodCtx;

/// Dispatcher under construction, before its exception table is attached.
pub struct Emitted {
    builder: MethodBuilder,
    pub node_blocks: HashMap<NodeId, BlockId>,
    pub fast_blocks: BTreeMap<u32, BlockId>,
    pub park_blocks: BTreeMap<u32, BlockId>,
    pub resume_blocks: BTreeMap<u32, BlockId>,
    /// Blocks guarded by the trailing catch-all.
    guarded: BTreeSet<BlockId>,
    fail_block: BlockId,
}

/// Locals of the dispatcher that the protocol code uses.
struct Slots {
    state: LocalId,
    resume: LocalId,
    frame: LocalId,
    outer: LocalId,
    pending: LocalId,
    next: LocalId,
    ret: Option<LocalId>,
    exc: LocalId,
    map: HashMap<LocalId, LocalId>,
}

impl Slots {
    fn local(&self, original: LocalId) -> LocalId {
        self.map.get(&original).copied().unwrap_or(original)
    }

    fn remap(&self, instr: &Instr) -> Instr {
        match instr {
            Instr::Load(l) => Instr::Load(self.local(*l)),
            Instr::Store(l) => Instr::Store(self.local(*l)),
            Instr::FrameLoad { frame, slot } => Instr::FrameLoad {
                frame: self.local(*frame),
                slot: *slot,
            },
            Instr::FrameStore { frame, slot } => Instr::FrameStore {
                frame: self.local(*frame),
                slot: *slot,
            },
            Instr::FrameOuter { frame } => Instr::FrameOuter {
                frame: self.local(*frame),
            },
            Instr::Resume {
                dispatcher,
                state,
                frame,
            } => Instr::Resume {
                dispatcher: dispatcher.clone(),
                state: *state,
                frame: self.local(*frame),
            },
            other => other.clone(),
        }
    }
}

pub fn emit(
    input: &Method,
    cfg: &Cfg,
    points: &[SuspensionPoint],
    seg: &Segmentation,
    ctx: &MethodCtx<'_>,
) -> Emitted {
    let name = ctx.options.dispatcher_name(&input.name);
    let mut b = MethodBuilder::new(name.clone(), Type::Future);
    let slots = declare_locals(&mut b, input);

    // ── Block layout ────────────────────────────────────────────────
    let head = b.current_block();
    let start = b.create_block();
    let mut node_blocks = HashMap::new();
    let mut fast_blocks = BTreeMap::new();
    let mut park_blocks = BTreeMap::new();
    let mut resume_blocks = BTreeMap::new();
    let point_at = |id: NodeId| points.iter().find(|p| p.node == id);

    for segment in &seg.segments {
        if segment.index > 0 {
            resume_blocks.insert(segment.index, b.create_block());
        }
        for &node in &segment.nodes {
            node_blocks.insert(node, b.create_block());
            if let Some(point) = point_at(node) {
                fast_blocks.insert(point.index, b.create_block());
                park_blocks.insert(point.index, b.create_block());
            }
        }
    }
    let fail = b.create_block();
    let rethrow = b.create_block();
    let reject = b.create_block();
    let bad_state = b.create_block();
    let block_of = |node: NodeId| node_blocks.get(&node).copied().unwrap_or(bad_state);

    // ── Head: state switch ──────────────────────────────────────────
    b.switch_to_block(head);
    b.push_all([
        Instr::FrameOuter { frame: slots.frame },
        Instr::Store(slots.outer),
        Instr::Load(slots.state),
    ]);
    let mut cases = vec![(0, start)];
    cases.extend(resume_blocks.iter().map(|(k, blk)| (*k as i64, *blk)));
    b.terminate(Terminator::Switch {
        cases,
        default: bad_state,
    });

    // ── State 0: arguments arrive through the frame ─────────────────
    b.switch_to_block(start);
    for (slot, param) in input.params.iter().enumerate() {
        b.push_all([
            Instr::FrameLoad {
                frame: slots.frame,
                slot: slot as u32,
            },
            Instr::Store(slots.local(param.id)),
        ]);
    }
    b.terminate(Terminator::Goto {
        target: block_of(cfg.entry),
    });

    // ── Resumption entries ──────────────────────────────────────────
    for point in points {
        let Some(&blk) = resume_blocks.get(&point.index) else {
            continue;
        };
        b.switch_to_block(blk);
        for (slot, (local, _)) in point.live.iter().enumerate() {
            b.push_all([
                Instr::FrameLoad {
                    frame: slots.frame,
                    slot: slot as u32,
                },
                Instr::Store(slots.local(local)),
            ]);
        }
        b.push_all([Instr::Load(slots.resume), Instr::OutcomeUnwrap]);
        if point.resume_ty.is_void() {
            b.push(Instr::Pop);
        }
        b.terminate(Terminator::Goto {
            target: block_of(point.resume),
        });
    }

    // ── Segment bodies ──────────────────────────────────────────────
    for segment in &seg.segments {
        for &id in &segment.nodes {
            let node = cfg.node(id);
            b.switch_to_block(block_of(id));
            b.push_all(node.instrs.iter().map(|i| slots.remap(i)));

            match &node.exit {
                Exit::Term(Terminator::Return) => {
                    emit_fulfill(&mut b, &slots);
                }
                Exit::Term(term) => {
                    b.terminate(term.map_targets(|t| block_of(NodeId::head(t))));
                }
                Exit::Suspend { resume, .. } => {
                    let Some(point) = point_at(id) else {
                        b.terminate(Terminator::Unreachable);
                        continue;
                    };
                    let fast = fast_blocks.get(&point.index).copied().unwrap_or(bad_state);
                    let park = park_blocks.get(&point.index).copied().unwrap_or(bad_state);
                    b.push_all([Instr::Dup, Instr::FutureIsDone]);
                    b.terminate(Terminator::Branch {
                        then_block: fast,
                        else_block: park,
                    });

                    b.switch_to_block(fast);
                    b.push(Instr::FutureJoin);
                    if point.resume_ty.is_void() {
                        b.push(Instr::Pop);
                    }
                    b.terminate(Terminator::Goto {
                        target: block_of(*resume),
                    });

                    b.switch_to_block(park);
                    emit_park(&mut b, &slots, point, &name);
                }
            }
        }
    }

    // ── Escaping exceptions ─────────────────────────────────────────
    b.switch_to_block(fail);
    b.push_all([
        Instr::Store(slots.exc),
        Instr::Load(slots.state),
        Instr::Push(Const::Int(0)),
        Instr::Binary(BinOp::Eq),
    ]);
    b.terminate(Terminator::Branch {
        then_block: rethrow,
        else_block: reject,
    });

    b.switch_to_block(rethrow);
    b.push(Instr::Load(slots.exc));
    b.terminate(Terminator::Throw);

    b.switch_to_block(reject);
    b.push_all([
        Instr::Load(slots.outer),
        Instr::Load(slots.exc),
        Instr::FutureReject,
        Instr::Load(slots.outer),
    ]);
    b.terminate(Terminator::Return);

    let mut guarded: BTreeSet<BlockId> = BTreeSet::new();
    guarded.insert(start);
    guarded.extend(node_blocks.values().copied());
    guarded.extend(fast_blocks.values().copied());
    guarded.extend(park_blocks.values().copied());
    guarded.extend(resume_blocks.values().copied());

    Emitted {
        builder: b,
        node_blocks,
        fast_blocks,
        park_blocks,
        resume_blocks,
        guarded,
        fail_block: fail,
    }
}

fn declare_locals(b: &mut MethodBuilder, input: &Method) -> Slots {
    let state = b.add_param("__state", Type::Int);
    let resume = b.add_param("__resume", Type::Outcome);
    let frame = b.add_param("__frame", Type::Frame);

    let mut map = HashMap::new();
    for local in &input.locals {
        let id = match &local.name {
            Some(name) => b.alloc_local(name.clone(), local.ty.clone()),
            None => b.alloc_temp(local.ty.clone()),
        };
        map.insert(local.id, id);
    }

    Slots {
        state,
        resume,
        frame,
        outer: b.alloc_local("__outer", Type::Future),
        pending: b.alloc_local("__pending", Type::Future),
        next: b.alloc_local("__next", Type::Frame),
        ret: (!input.ret_ty.is_void()).then(|| b.alloc_local("__ret", input.ret_ty.clone())),
        exc: b.alloc_local("__exc", Type::object("Throwable")),
        map,
    }
}

fn emit_fulfill(b: &mut MethodBuilder, slots: &Slots) {
    match slots.ret {
        Some(ret) => b.push_all([
            Instr::Store(ret),
            Instr::Load(slots.outer),
            Instr::Load(ret),
        ]),
        None => b.push_all([Instr::Load(slots.outer), Instr::Push(Const::Null)]),
    }
    b.push_all([Instr::FutureFulfill, Instr::Load(slots.outer)]);
    b.terminate(Terminator::Return);
}

/// Save the live set, register the resumption, hand back the outer future.
fn emit_park(b: &mut MethodBuilder, slots: &Slots, point: &SuspensionPoint, dispatcher: &str) {
    b.push_all([
        Instr::Store(slots.pending),
        Instr::Load(slots.outer),
        Instr::FrameNew {
            slots: point.live.len() as u32,
        },
        Instr::Store(slots.next),
    ]);
    for (slot, (local, _)) in point.live.iter().enumerate() {
        b.push_all([
            Instr::Load(slots.local(local)),
            Instr::FrameStore {
                frame: slots.next,
                slot: slot as u32,
            },
        ]);
    }
    b.push_all([
        Instr::Load(slots.pending),
        Instr::Resume {
            dispatcher: dispatcher.to_string(),
            state: point.index,
            frame: slots.next,
        },
        Instr::Load(slots.outer),
    ]);
    b.terminate(Terminator::Return);
}

impl Emitted {
    /// Attach the rewritten regions, then the catch-all, and seal the
    /// dispatcher as a private synthetic method.
    pub fn finish(mut self, input: &Method, pieces: &[RegionPiece]) -> Method {
        for piece in pieces {
            self.builder
                .add_region(piece.blocks.iter().copied(), piece.handler, piece.kind.clone());
        }
        self.builder
            .add_region(self.guarded.iter().copied(), self.fail_block, RegionKind::CatchAll);

        for class in &input.throws {
            self.builder.declare_throws(class.clone());
        }
        self.builder.set_flags(MethodFlags {
            public: false,
            is_static: input.flags.is_static,
            synthetic: true,
            lambda: false,
        });
        self.builder.finish()
    }
}

/// Call signature of a dispatcher.
pub fn dispatcher_ref(name: &str) -> FunctionRef {
    FunctionRef::new(name, 3, Type::Future)
}
