// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Display implementations for the method model.

use std::fmt;

use crate::*;

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "string"),
            Type::Object(class) => write!(f, "{}", class),
            Type::Future => write!(f, "future"),
            Type::Frame => write!(f, "frame"),
            Type::Outcome => write!(f, "outcome"),
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Null => write!(f, "null"),
            Const::Bool(v) => write!(f, "{}", v),
            Const::Int(v) => write!(f, "{}", v),
            Const::Float(v) => write!(f, "{}", v),
            Const::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Gt => "gt",
            BinOp::Le => "le",
            BinOp::Ge => "ge",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        write!(f, "{}", sym)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "neg"),
            UnaryOp::Not => write!(f, "not"),
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} -> {}", self.name, self.argc, self.ret)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Push(c) => write!(f, "push {}", c),
            Instr::Load(l) => write!(f, "load _{}", l.0),
            Instr::Store(l) => write!(f, "store _{}", l.0),
            Instr::Dup => write!(f, "dup"),
            Instr::Pop => write!(f, "pop"),
            Instr::Swap => write!(f, "swap"),
            Instr::Binary(op) => write!(f, "{}", op),
            Instr::Unary(op) => write!(f, "{}", op),
            Instr::Invoke { func } => write!(f, "invoke {}", func),
            Instr::New { class, argc } => write!(f, "new {}/{}", class, argc),
            Instr::MonitorEnter => write!(f, "monitor_enter"),
            Instr::MonitorExit => write!(f, "monitor_exit"),
            Instr::MakeClosure { method, captures } => {
                write!(f, "closure {}/{}", method, captures)
            }
            Instr::CallClosure { argc, ret } => write!(f, "call_closure/{} -> {}", argc, ret),
            Instr::FutureNew => write!(f, "future_new"),
            Instr::FutureIsDone => write!(f, "future_is_done"),
            Instr::FutureJoin => write!(f, "future_join"),
            Instr::FutureFulfill => write!(f, "future_fulfill"),
            Instr::FutureReject => write!(f, "future_reject"),
            Instr::FrameNew { slots } => write!(f, "frame_new {}", slots),
            Instr::FrameLoad { frame, slot } => write!(f, "frame_load _{}[{}]", frame.0, slot),
            Instr::FrameStore { frame, slot } => write!(f, "frame_store _{}[{}]", frame.0, slot),
            Instr::FrameOuter { frame } => write!(f, "frame_outer _{}", frame.0),
            Instr::OutcomeUnwrap => write!(f, "outcome_unwrap"),
            Instr::Resume {
                dispatcher,
                state,
                frame,
            } => write!(f, "resume {}@{} with _{}", dispatcher, state, frame.0),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto { target } => write!(f, "goto bb{}", target.0),
            Terminator::Branch {
                then_block,
                else_block,
            } => write!(f, "if then bb{} else bb{}", then_block.0, else_block.0),
            Terminator::Switch { cases, default } => {
                write!(f, "switch [")?;
                for (i, (val, block)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: bb{}", val, block.0)?;
                }
                write!(f, ", default: bb{}]", default.0)
            }
            Terminator::Return => write!(f, "return"),
            Terminator::Throw => write!(f, "throw"),
            Terminator::EndFinally => write!(f, "end_finally"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Catch(class) => write!(f, "catch {}", class),
            RegionKind::CatchAll => write!(f, "catch *"),
            RegionKind::Finally => write!(f, "finally"),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}:{}", self.block.0, self.offset)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "(")?;
            for (i, (key, value)) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} = {}", key, value)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for annotation in &self.annotations {
            writeln!(f, "{}", annotation)?;
        }
        if self.flags.public {
            write!(f, "public ")?;
        }
        if self.flags.is_static {
            write!(f, "static ")?;
        }
        if self.flags.synthetic {
            write!(f, "synthetic ")?;
        }

        // Signature
        write!(f, "method {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if let Some(name) = &p.name {
                write!(f, "{}: {}", name, p.ty)?;
            } else {
                write!(f, "_{}: {}", p.id.0, p.ty)?;
            }
        }
        write!(f, ") -> {}", self.ret_ty)?;
        if !self.throws.is_empty() {
            write!(f, " throws {}", self.throws.join(", "))?;
        }
        writeln!(f, " {{")?;

        // Locals (non-param)
        for local in &self.locals {
            if !local.is_param {
                if let Some(name) = &local.name {
                    writeln!(f, "  let {}: {}  // _{}", name, local.ty, local.id.0)?;
                } else {
                    writeln!(f, "  let _{}: {}", local.id.0, local.ty)?;
                }
            }
        }
        if self.locals.iter().any(|l| !l.is_param) {
            writeln!(f)?;
        }

        // Blocks
        for block in &self.blocks {
            writeln!(f, "  bb{}:", block.id.0)?;
            for instr in &block.instrs {
                writeln!(f, "    {}", instr)?;
            }
            writeln!(f, "    {}", block.terminator)?;
        }

        // Exception table
        if !self.regions.is_empty() {
            writeln!(f, "  regions:")?;
            for region in &self.regions {
                let blocks: Vec<String> =
                    region.blocks.iter().map(|b| format!("bb{}", b.0)).collect();
                writeln!(
                    f,
                    "    r{}: [{}] -> bb{} {}",
                    region.id.0,
                    blocks.join(", "),
                    region.handler.0,
                    region.kind
                )?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_signature_blocks_and_regions() {
        let mut b = MethodBuilder::new("load", Type::Int);
        b.annotate(Annotation::marker("Traced"));
        b.declare_throws("IOException");
        let key = b.add_param("key", Type::Str);
        let body = b.create_block();
        let handler = b.create_block();
        b.terminate(Terminator::Goto { target: body });

        b.switch_to_block(body);
        b.push(Instr::Load(key));
        b.push(Instr::Invoke {
            func: FunctionRef::new("Store.get", 1, Type::Int),
        });
        b.terminate(Terminator::Return);

        b.switch_to_block(handler);
        b.push(Instr::Pop);
        b.push(Instr::Push(Const::Int(-1)));
        b.terminate(Terminator::Return);
        b.add_region([body], handler, RegionKind::Catch("IOException".into()));

        let text = b.finish().to_string();
        let expected = "\
@Traced
method load(key: string) -> int throws IOException {
  bb0:
    goto bb1
  bb1:
    load _0
    invoke Store.get/1 -> int
    return
  bb2:
    pop
    push -1
    return
  regions:
    r0: [bb1] -> bb2 catch IOException
}";
        assert_eq!(text, expected);
    }
}
