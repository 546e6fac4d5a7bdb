use std::collections::HashMap;

use crate::value::Value;

/// Which of the three frame kinds a variable reference names.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FrameKind {
    Global,
    Local,
    Temporary,
}

impl FrameKind {
    pub fn label(self) -> &'static str {
        match self {
            FrameKind::Global => "GF",
            FrameKind::Local => "LF",
            FrameKind::Temporary => "TF",
        }
    }
}

/// An ordered mapping from variable name to `Value | Undefined`. Names
/// within a frame are unique; `define` enforces that, `set` never creates
/// a new slot.
#[derive(Debug, Default)]
pub struct Frame {
    slots: HashMap<String, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Frame {
            slots: HashMap::new(),
        }
    }

    /// Declares `name` as `Undefined`. `Err(())` if already declared.
    pub fn define(&mut self, name: &str) -> Result<(), ()> {
        if self.slots.contains_key(name) {
            Err(())
        } else {
            self.slots.insert(name.to_string(), Value::Undefined);
            Ok(())
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }

    /// `Err(())` if `name` was never declared with `define`.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ()> {
        match self.slots.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(()),
        }
    }

    pub fn initialized_count(&self) -> usize {
        self.slots.values().filter(|v| !v.is_undefined()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_rejects_redeclaration() {
        let mut frame = Frame::new();
        assert_eq!(frame.define("x"), Ok(()));
        assert_eq!(frame.define("x"), Err(()));
    }

    #[test]
    fn set_rejects_undeclared_name() {
        let mut frame = Frame::new();
        assert_eq!(frame.set("x", Value::Int(1)), Err(()));
    }

    #[test]
    fn initialized_count_ignores_undefined_slots() {
        let mut frame = Frame::new();
        frame.define("a").unwrap();
        frame.define("b").unwrap();
        assert_eq!(frame.initialized_count(), 0);
        frame.set("a", Value::Int(1)).unwrap();
        assert_eq!(frame.initialized_count(), 1);
    }
}
