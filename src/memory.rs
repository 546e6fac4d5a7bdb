use crate::error::{Error, Result};
use crate::frame::{Frame, FrameKind};
use crate::value::Value;

/// `{ global: Frame, temporary: Frame | None, locals: stack<Frame> }`.
///
/// `push_frame`/`pop_frame` move the temporary frame on and off the local
/// stack wholesale; `create_frame` replaces whatever temporary frame was
/// there, discarding it.
#[derive(Default)]
pub struct Memory {
    global: Frame,
    temporary: Option<Frame>,
    locals: Vec<Frame>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            global: Frame::new(),
            temporary: None,
            locals: Vec::new(),
        }
    }

    fn frame(&self, kind: FrameKind) -> Result<&Frame> {
        match kind {
            FrameKind::Global => Ok(&self.global),
            FrameKind::Temporary => self
                .temporary
                .as_ref()
                .ok_or_else(|| Error::FrameMissing(kind.label().to_string())),
            FrameKind::Local => self
                .locals
                .last()
                .ok_or_else(|| Error::FrameMissing(kind.label().to_string())),
        }
    }

    fn frame_mut(&mut self, kind: FrameKind) -> Result<&mut Frame> {
        match kind {
            FrameKind::Global => Ok(&mut self.global),
            FrameKind::Temporary => self
                .temporary
                .as_mut()
                .ok_or_else(|| Error::FrameMissing(kind.label().to_string())),
            FrameKind::Local => self
                .locals
                .last_mut()
                .ok_or_else(|| Error::FrameMissing(kind.label().to_string())),
        }
    }

    pub fn create_frame(&mut self) {
        self.temporary = Some(Frame::new());
    }

    pub fn push_frame(&mut self) -> Result<()> {
        let frame = self
            .temporary
            .take()
            .ok_or_else(|| Error::FrameMissing(FrameKind::Temporary.label().to_string()))?;
        self.locals.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Result<()> {
        let frame = self
            .locals
            .pop()
            .ok_or_else(|| Error::FrameMissing(FrameKind::Local.label().to_string()))?;
        self.temporary = Some(frame);
        Ok(())
    }

    pub fn define(&mut self, kind: FrameKind, name: &str) -> Result<()> {
        self.frame_mut(kind)?
            .define(name)
            .map_err(|_| Error::Semantic(format!("variable '{}' is already defined", name)))
    }

    pub fn read(&self, kind: FrameKind, name: &str) -> Result<&Value> {
        self.frame(kind)?.get(name).ok_or_else(|| Error::VarUndefined {
            frame: kind.label().to_string(),
            name: name.to_string(),
        })
    }

    pub fn write(&mut self, kind: FrameKind, name: &str, value: Value) -> Result<()> {
        let label = kind.label();
        self.frame_mut(kind)?
            .set(name, value)
            .map_err(|_| Error::VarUndefined {
                frame: label.to_string(),
                name: name.to_string(),
            })
    }

    /// Count of slots across all frames whose value is not `Undefined`.
    /// Counts initialized *values*, not declared names.
    pub fn initialized_count(&self) -> usize {
        let mut total = self.global.initialized_count();
        if let Some(temp) = &self.temporary {
            total += temp.initialized_count();
        }
        for local in &self.locals {
            total += local.initialized_count();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_discipline_round_trip() {
        let mut mem = Memory::new();
        assert!(matches!(mem.push_frame(), Err(Error::FrameMissing(_))));

        mem.create_frame();
        mem.define(FrameKind::Temporary, "x").unwrap();
        mem.push_frame().unwrap();

        assert!(matches!(mem.read(FrameKind::Temporary, "x"), Err(Error::FrameMissing(_))));
        assert_eq!(*mem.read(FrameKind::Local, "x").unwrap(), Value::Undefined);

        mem.pop_frame().unwrap();
        assert_eq!(*mem.read(FrameKind::Temporary, "x").unwrap(), Value::Undefined);
        assert!(matches!(mem.read(FrameKind::Local, "x"), Err(Error::FrameMissing(_))));
    }

    #[test]
    fn pop_frame_without_locals_is_frame_missing() {
        let mut mem = Memory::new();
        assert!(matches!(mem.pop_frame(), Err(Error::FrameMissing(_))));
    }

    #[test]
    fn initialized_count_spans_all_frames() {
        let mut mem = Memory::new();
        mem.define(FrameKind::Global, "g").unwrap();
        mem.write(FrameKind::Global, "g", Value::Int(1)).unwrap();

        mem.create_frame();
        mem.define(FrameKind::Temporary, "t").unwrap();
        mem.write(FrameKind::Temporary, "t", Value::Int(2)).unwrap();
        mem.push_frame().unwrap();

        assert_eq!(mem.initialized_count(), 2);
    }

    #[test]
    fn redefine_in_same_frame_is_semantic_error() {
        let mut mem = Memory::new();
        mem.define(FrameKind::Global, "x").unwrap();
        assert!(matches!(mem.define(FrameKind::Global, "x"), Err(Error::Semantic(_))));
    }
}
