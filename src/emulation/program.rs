//! Executable form of a decoded method body.
//!
//! The interpreter works on instruction indices. Branch labels are resolved to indices once,
//! and the region markers are folded back into a clause table (innermost first, the order
//! the runtime searches handlers in).

use std::collections::HashMap;

use crate::{
    assembly::{DecodedMethod, ExceptionMarker, Instruction, Label},
    emulation::EmulationError,
    metadata::{signatures::{MethodSig, TypeSig}, token::Token},
};

/// How a clause handles exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClauseKind {
    Catch(Token),
    /// Filter block start index
    Filter(usize),
    Finally,
    Fault,
}

/// One handler of a protected region, in instruction indices (ends exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Clause {
    pub kind: ClauseKind,
    pub try_start: usize,
    pub try_end: usize,
    pub handler_start: usize,
    pub handler_end: usize,
}

impl Clause {
    pub fn protects(&self, index: usize) -> bool {
        (self.try_start..self.try_end).contains(&index)
    }

    pub fn runs_on_unwind(&self) -> bool {
        matches!(self.kind, ClauseKind::Finally | ClauseKind::Fault)
    }
}

struct OpenHandler {
    kind: ClauseKind,
    /// Set once the handler proper starts; filters start with their filter block
    start: Option<usize>,
}

struct OpenRegion {
    try_start: usize,
    try_end: Option<usize>,
    handlers: Vec<(OpenHandler, usize)>,
    current: Option<OpenHandler>,
}

impl OpenRegion {
    fn close_current(&mut self, end: usize) {
        if let Some(handler) = self.current.take() {
            self.handlers.push((handler, end));
        }
    }

    fn begin(&mut self, index: usize, handler: OpenHandler) {
        self.try_end.get_or_insert(index);
        self.close_current(index);
        self.current = Some(handler);
    }
}

fn handler_error(description: &str) -> EmulationError {
    EmulationError::InvalidExceptionHandler {
        description: description.to_string(),
    }
}

/// Fold region markers into clauses.
pub(crate) fn clauses(instructions: &[Instruction]) -> Result<Vec<Clause>, EmulationError> {
    let mut clauses = Vec::new();
    let mut open: Vec<OpenRegion> = Vec::new();

    for (index, instruction) in instructions.iter().enumerate() {
        let (ends, begins): (Vec<&ExceptionMarker>, Vec<&ExceptionMarker>) = instruction
            .blocks
            .iter()
            .partition(|marker| **marker == ExceptionMarker::End);

        for marker in begins {
            let (kind, start) = match marker {
                ExceptionMarker::TryBegin => {
                    open.push(OpenRegion {
                        try_start: index,
                        try_end: None,
                        handlers: Vec::new(),
                        current: None,
                    });
                    continue;
                }
                ExceptionMarker::FilterHandlerBegin => {
                    let region = open
                        .last_mut()
                        .ok_or_else(|| handler_error("stray filter handler"))?;
                    match region.current.as_mut() {
                        Some(current) if matches!(current.kind, ClauseKind::Filter(_)) => {
                            current.start = Some(index);
                        }
                        _ => return Err(handler_error("filter handler without filter")),
                    }
                    continue;
                }
                ExceptionMarker::CatchBegin(class) => (ClauseKind::Catch(*class), Some(index)),
                ExceptionMarker::FilterBegin => (ClauseKind::Filter(index), None),
                ExceptionMarker::FinallyBegin => (ClauseKind::Finally, Some(index)),
                ExceptionMarker::FaultBegin | ExceptionMarker::End => (ClauseKind::Fault, Some(index)),
            };

            let region = open
                .last_mut()
                .ok_or_else(|| handler_error("handler outside a region"))?;
            region.begin(index, OpenHandler { kind, start });
        }

        for _ in ends {
            let mut region = open.pop().ok_or_else(|| handler_error("unbalanced region end"))?;
            region.close_current(index + 1);
            let try_end = region.try_end.ok_or_else(|| handler_error("region without handler"))?;
            for (handler, end) in region.handlers {
                let handler_start = handler
                    .start
                    .ok_or_else(|| handler_error("filter without handler block"))?;
                clauses.push(Clause {
                    kind: handler.kind,
                    try_start: region.try_start,
                    try_end,
                    handler_start,
                    handler_end: end,
                });
            }
        }
    }

    if open.is_empty() {
        Ok(clauses)
    } else {
        Err(handler_error("unterminated region"))
    }
}

/// A method ready for execution.
#[derive(Debug)]
pub(crate) struct Program {
    pub name: String,
    pub sig: MethodSig,
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<Label, usize>,
    pub locals: Vec<TypeSig>,
    pub clauses: Vec<Clause>,
}

impl Program {
    pub fn new(name: &str, sig: &MethodSig, decoded: &DecodedMethod) -> Result<Self, EmulationError> {
        Ok(Program {
            name: name.to_string(),
            sig: sig.clone(),
            instructions: decoded.instructions.clone(),
            labels: decoded.label_map(),
            locals: decoded.locals.clone(),
            clauses: clauses(&decoded.instructions)?,
        })
    }

    pub fn target(&self, label: Label) -> Result<usize, EmulationError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(EmulationError::InvalidBranchTarget { label: label.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OpCode;

    #[test]
    fn nested_regions_innermost_first() {
        let class = Token(0x0200_0001);
        let code = vec![
            Instruction::nop().with_block(ExceptionMarker::TryBegin),
            Instruction::nop().with_block(ExceptionMarker::TryBegin),
            Instruction::leave(Label(0)),
            Instruction::simple(OpCode::Pop).with_block(ExceptionMarker::CatchBegin(class)),
            Instruction::leave(Label(0)).with_block(ExceptionMarker::End),
            Instruction::leave(Label(0)),
            Instruction::simple(OpCode::Endfinally)
                .with_block(ExceptionMarker::FinallyBegin)
                .with_block(ExceptionMarker::End),
            Instruction::ret().with_label(Label(0)),
        ];

        let clauses = clauses(&code).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(
            clauses[0],
            Clause {
                kind: ClauseKind::Catch(class),
                try_start: 1,
                try_end: 3,
                handler_start: 3,
                handler_end: 5,
            }
        );
        assert_eq!(clauses[1].kind, ClauseKind::Finally);
        assert_eq!((clauses[1].try_start, clauses[1].try_end), (0, 6));
        assert_eq!((clauses[1].handler_start, clauses[1].handler_end), (6, 7));
        assert!(clauses[1].protects(4));
        assert!(!clauses[1].protects(6));
    }

    #[test]
    fn filter_blocks() {
        let code = vec![
            Instruction::nop().with_block(ExceptionMarker::TryBegin),
            Instruction::leave(Label(0)),
            Instruction::simple(OpCode::Pop).with_block(ExceptionMarker::FilterBegin),
            Instruction::ldc_i4(1),
            Instruction::simple(OpCode::Endfilter),
            Instruction::simple(OpCode::Pop).with_block(ExceptionMarker::FilterHandlerBegin),
            Instruction::leave(Label(0)).with_block(ExceptionMarker::End),
            Instruction::ret().with_label(Label(0)),
        ];

        let clauses = clauses(&code).unwrap();
        assert_eq!(clauses[0].kind, ClauseKind::Filter(2));
        assert_eq!((clauses[0].handler_start, clauses[0].handler_end), (5, 7));
        assert_eq!(clauses[0].try_end, 2);
    }
}
