use std::io::{BufRead, Write};

use log::{info, trace, warn};

use crate::constants;
use crate::error::{Error, Result};
use crate::instructions::{Instruction, OpCode};
use crate::loader::Program;
use crate::memory::Memory;
use crate::operand::Operand;
use crate::value::Value;

/// Owns every piece of mutable state the source model describes as
/// process-wide: memory, both stacks, the program counter, and the
/// collected statistics. Opcode handlers take `&mut self` rather than
/// threading these through individually.
pub struct Engine {
    instructions: Vec<Instruction>,
    labels: std::collections::HashMap<String, usize>,
    memory: Memory,
    data_stack: Vec<Value>,
    call_stack: Vec<usize>,
    pc: usize,
    return_code: i32,
    stats: crate::stats::Stats,
}

/// Statistics plus the process exit code produced by a completed run.
pub struct RunOutcome {
    pub return_code: i32,
    pub stats: crate::stats::Stats,
}

impl Engine {
    pub fn new(program: Program) -> Self {
        Engine {
            instructions: program.instructions,
            labels: program.labels,
            memory: Memory::new(),
            data_stack: Vec::new(),
            call_stack: Vec::new(),
            pc: 0,
            return_code: 0,
            stats: crate::stats::Stats::new(),
        }
    }

    /// Runs the loaded program to completion, reading `READ`'s input from
    /// `input` and writing `WRITE`'s output to `output`.
    pub fn run(mut self, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<RunOutcome> {
        while self.pc < self.instructions.len() {
            self.stats.observe_vars(self.memory.initialized_count());

            let current_pc = self.pc;
            let opcode = self.instructions[current_pc].opcode;
            trace!("pc={} dispatch {:?}", current_pc, opcode);

            self.dispatch(input, output)?;

            if opcode.counts_toward_stats() {
                let order = self.instructions[current_pc].order;
                self.instructions[current_pc].exec_count += 1;
                let count = self.instructions[current_pc].exec_count;
                self.stats.record_dispatch();
                self.stats.record_execution(order, count);
            }

            // Jump targets are label indices; unconditionally stepping
            // past them here is what skips over the no-op LABEL itself,
            // whether pc just got here by falling through or by a jump.
            self.pc += 1;
        }

        info!("program terminated with return code {}", self.return_code);
        Ok(RunOutcome {
            return_code: self.return_code,
            stats: self.stats,
        })
    }

    fn args(&self) -> &[Operand] {
        &self.instructions[self.pc].args
    }

    /// An owned copy of argument `i`, for call sites that need to pair a
    /// write target with a mutable borrow of `self.memory` in the same
    /// expression.
    fn arg(&self, i: usize) -> Operand {
        self.instructions[self.pc].args[i].clone()
    }

    fn type_error(&self, detail: impl Into<String>) -> Error {
        let ins = &self.instructions[self.pc];
        Error::TypeError {
            order: ins.order,
            opcode: format!("{:?}", ins.opcode),
            detail: detail.into(),
        }
    }

    fn dispatch(&mut self, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<()> {
        match self.instructions[self.pc].opcode {
            OpCode::MOVE => self.op_move(),
            OpCode::CREATEFRAME => {
                self.memory.create_frame();
                Ok(())
            }
            OpCode::PUSHFRAME => {
                warn!("PUSHFRAME at pc={}", self.pc);
                self.memory.push_frame()
            }
            OpCode::POPFRAME => {
                warn!("POPFRAME at pc={}", self.pc);
                self.memory.pop_frame()
            }
            OpCode::DEFVAR => self.op_defvar(),
            OpCode::CALL => self.op_call(),
            OpCode::RETURN => self.op_return(),
            OpCode::PUSHS => self.op_pushs(),
            OpCode::POPS => self.op_pops(),
            OpCode::ADD | OpCode::SUB | OpCode::MUL => self.op_arith(),
            OpCode::IDIV => self.op_idiv(),
            OpCode::DIV => self.op_div(),
            OpCode::LT | OpCode::GT => self.op_compare(),
            OpCode::EQ => self.op_eq(),
            OpCode::AND | OpCode::OR => self.op_bool(),
            OpCode::NOT => self.op_not(),
            OpCode::INT2CHAR => self.op_int2char(),
            OpCode::STRI2INT => self.op_stri2int(),
            OpCode::INT2FLOAT => self.op_int2float(),
            OpCode::FLOAT2INT => self.op_float2int(),
            OpCode::READ => self.op_read(input),
            OpCode::WRITE => self.op_write(output),
            OpCode::CONCAT => self.op_concat(),
            OpCode::STRLEN => self.op_strlen(),
            OpCode::GETCHAR => self.op_getchar(),
            OpCode::SETCHAR => self.op_setchar(),
            OpCode::TYPE => self.op_type(),
            OpCode::LABEL => Ok(()),
            OpCode::JUMP => self.op_jump(),
            OpCode::JUMPIFEQ => self.op_jumpif(true),
            OpCode::JUMPIFNEQ => self.op_jumpif(false),
            OpCode::EXIT => self.op_exit(),
            OpCode::DPRINT => self.op_dprint(),
            OpCode::BREAK => self.op_break(),
        }
    }

    fn op_move(&mut self) -> Result<()> {
        let value = self.args()[1].read(&self.memory, false)?;
        self.arg(0).write(&mut self.memory, value)
    }

    fn op_defvar(&mut self) -> Result<()> {
        let dest = self.arg(0);
        let var = dest.as_var();
        self.memory.define(var.frame, &var.name)
    }

    fn op_call(&mut self) -> Result<()> {
        let target = self.args()[0].as_label().to_string();
        self.call_stack.push(self.pc);
        self.pc = self.labels[&target];
        Ok(())
    }

    fn op_return(&mut self) -> Result<()> {
        self.pc = self
            .call_stack
            .pop()
            .ok_or_else(|| Error::ValueMissing("call stack is empty".to_string()))?;
        Ok(())
    }

    fn op_pushs(&mut self) -> Result<()> {
        let value = self.args()[0].read(&self.memory, false)?;
        self.data_stack.push(value);
        Ok(())
    }

    fn op_pops(&mut self) -> Result<()> {
        let value = self
            .data_stack
            .pop()
            .ok_or_else(|| Error::ValueMissing("data stack is empty".to_string()))?;
        self.arg(0).write(&mut self.memory, value)
    }

    fn op_arith(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let opcode = self.instructions[self.pc].opcode;
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(match opcode {
                OpCode::ADD => x.wrapping_add(y),
                OpCode::SUB => x.wrapping_sub(y),
                OpCode::MUL => x.wrapping_mul(y),
                _ => unreachable!(),
            }),
            (Value::Float(x), Value::Float(y)) => Value::Float(match opcode {
                OpCode::ADD => x + y,
                OpCode::SUB => x - y,
                OpCode::MUL => x * y,
                _ => unreachable!(),
            }),
            _ => return Err(self.type_error("expected two Int or two Float operands")),
        };
        self.arg(0).write(&mut self.memory, result)
    }

    fn op_idiv(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let (x, y) = match (a, b) {
            (Value::Int(x), Value::Int(y)) => (x, y),
            _ => return Err(self.type_error("expected two Int operands")),
        };
        if y == 0 {
            return Err(Error::OperandValue("integer division by zero".to_string()));
        }
        self.arg(0).write(&mut self.memory, Value::Int(x.wrapping_div(y)))
    }

    fn op_div(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let (x, y) = match (a, b) {
            (Value::Float(x), Value::Float(y)) => (x, y),
            _ => return Err(self.type_error("expected two Float operands")),
        };
        if y == 0.0 {
            return Err(Error::OperandValue("float division by zero".to_string()));
        }
        self.arg(0).write(&mut self.memory, Value::Float(x / y))
    }

    fn op_compare(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let opcode = self.instructions[self.pc].opcode;
        let ordering = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
            (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.partial_cmp(y),
            (Value::String(x), Value::String(y)) => x.partial_cmp(y),
            _ => return Err(self.type_error("operands must share a comparable type")),
        };
        let ordering = ordering.ok_or_else(|| self.type_error("operands are not comparable"))?;
        let result = match opcode {
            OpCode::LT => ordering.is_lt(),
            OpCode::GT => ordering.is_gt(),
            _ => unreachable!(),
        };
        self.arg(0).write(&mut self.memory, Value::Bool(result))
    }

    fn op_eq(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let result = values_equal(&a, &b).ok_or_else(|| self.type_error("operands are not comparable for equality"))?;
        self.arg(0).write(&mut self.memory, Value::Bool(result))
    }

    fn op_bool(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let opcode = self.instructions[self.pc].opcode;
        let (x, y) = match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => (x, y),
            _ => return Err(self.type_error("expected two Bool operands")),
        };
        let result = match opcode {
            OpCode::AND => x && y,
            OpCode::OR => x || y,
            _ => unreachable!(),
        };
        self.arg(0).write(&mut self.memory, Value::Bool(result))
    }

    fn op_not(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let x = match a {
            Value::Bool(x) => x,
            _ => return Err(self.type_error("expected a Bool operand")),
        };
        self.arg(0).write(&mut self.memory, Value::Bool(!x))
    }

    fn op_int2char(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let code = match a {
            Value::Int(i) => i,
            _ => return Err(self.type_error("expected an Int operand")),
        };
        let ch = u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| Error::StringError(format!("{} is not a valid code point", code)))?;
        self.arg(0).write(&mut self.memory, Value::String(ch.to_string()))
    }

    fn op_stri2int(&mut self) -> Result<()> {
        let s = self.args()[1].read(&self.memory, false)?;
        let i = self.args()[2].read(&self.memory, false)?;
        let (s, i) = match (s, i) {
            (Value::String(s), Value::Int(i)) => (s, i),
            _ => return Err(self.type_error("expected (String, Int) operands")),
        };
        let ch = char_at(&s, i).ok_or_else(|| Error::StringError(format!("index {} out of range", i)))?;
        self.arg(0).write(&mut self.memory, Value::Int(ch as i64))
    }

    fn op_int2float(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let i = match a {
            Value::Int(i) => i,
            _ => return Err(self.type_error("expected an Int operand")),
        };
        self.arg(0).write(&mut self.memory, Value::Float(i as f64))
    }

    fn op_float2int(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let f = match a {
            Value::Float(f) => f,
            _ => return Err(self.type_error("expected a Float operand")),
        };
        self.arg(0).write(&mut self.memory, Value::Int(f.trunc() as i64))
    }

    fn op_read(&mut self, input: &mut dyn BufRead) -> Result<()> {
        let type_tag = self.args()[1].as_type_tag().to_string();
        let mut line = String::new();
        let value = if input.read_line(&mut line).unwrap_or(0) == 0 {
            Value::Nil
        } else {
            let text = line.trim_end_matches(['\n', '\r']);
            parse_read_value(&type_tag, text).unwrap_or(Value::Nil)
        };
        self.arg(0).write(&mut self.memory, value)
    }

    fn op_write(&mut self, output: &mut dyn Write) -> Result<()> {
        let value = self.args()[0].read(&self.memory, false)?;
        write!(output, "{}", value).map_err(|e| Error::IoWrite {
            path: "<stdout>".into(),
            source: e,
        })
    }

    fn op_concat(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let (a, b) = match (a, b) {
            (Value::String(a), Value::String(b)) => (a, b),
            _ => return Err(self.type_error("expected two String operands")),
        };
        self.arg(0).write(&mut self.memory, Value::String(a + &b))
    }

    fn op_strlen(&mut self) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let s = match a {
            Value::String(s) => s,
            _ => return Err(self.type_error("expected a String operand")),
        };
        self.arg(0).write(&mut self.memory, Value::Int(s.chars().count() as i64))
    }

    fn op_getchar(&mut self) -> Result<()> {
        let s = self.args()[1].read(&self.memory, false)?;
        let i = self.args()[2].read(&self.memory, false)?;
        let (s, i) = match (s, i) {
            (Value::String(s), Value::Int(i)) => (s, i),
            _ => return Err(self.type_error("expected (String, Int) operands")),
        };
        let ch = char_at(&s, i).ok_or_else(|| Error::StringError(format!("index {} out of range", i)))?;
        self.arg(0).write(&mut self.memory, Value::String(ch.to_string()))
    }

    fn op_setchar(&mut self) -> Result<()> {
        // Read the destination's current string before touching anything
        // else, then write the whole modified string back to the same
        // variable — index and replacement come from the other operands.
        let dest_value = self.args()[0].read(&self.memory, false)?;
        let mut chars: Vec<char> = match dest_value {
            Value::String(s) => s.chars().collect(),
            _ => return Err(self.type_error("destination must hold a String")),
        };

        let i = self.args()[1].read(&self.memory, false)?;
        let replacement = self.args()[2].read(&self.memory, false)?;
        let (i, replacement) = match (i, replacement) {
            (Value::Int(i), Value::String(s)) => (i, s),
            _ => return Err(self.type_error("expected (Int, String) operands")),
        };
        let first = replacement
            .chars()
            .next()
            .ok_or_else(|| Error::StringError("replacement string is empty".to_string()))?;

        let idx = usize::try_from(i).ok().filter(|&idx| idx < chars.len());
        let idx = idx.ok_or_else(|| Error::StringError(format!("index {} out of range", i)))?;
        chars[idx] = first;

        self.arg(0).write(&mut self.memory, Value::String(chars.into_iter().collect()))
    }

    fn op_type(&mut self) -> Result<()> {
        let value = self.args()[1].read(&self.memory, true)?;
        self.arg(0).write(&mut self.memory, Value::String(value.type_name().to_string()))
    }

    fn op_jump(&mut self) -> Result<()> {
        let target = self.args()[0].as_label().to_string();
        self.pc = self.labels[&target];
        Ok(())
    }

    fn op_jumpif(&mut self, want_equal: bool) -> Result<()> {
        let a = self.args()[1].read(&self.memory, false)?;
        let b = self.args()[2].read(&self.memory, false)?;
        let equal = values_equal(&a, &b).ok_or_else(|| self.type_error("operands are not comparable for equality"))?;
        if equal == want_equal {
            let target = self.args()[0].as_label().to_string();
            self.pc = self.labels[&target];
        }
        Ok(())
    }

    fn op_exit(&mut self) -> Result<()> {
        let a = self.args()[0].read(&self.memory, false)?;
        let code = match a {
            Value::Int(i) => i,
            _ => return Err(self.type_error("expected an Int operand")),
        };
        if !(0..=constants::EXIT_CODE_MAX).contains(&code) {
            return Err(Error::OperandValue(format!(
                "exit code {} is out of range 0..={}",
                code,
                constants::EXIT_CODE_MAX
            )));
        }
        self.return_code = code as i32;
        self.pc = self.instructions.len();
        Ok(())
    }

    fn op_dprint(&mut self) -> Result<()> {
        let value = self.args()[0].read(&self.memory, false)?;
        log::debug!("DPRINT: {}", value);
        Ok(())
    }

    fn op_break(&mut self) -> Result<()> {
        info!(
            "BREAK at pc={}: insts={} vars={}",
            self.pc,
            self.stats.insts(),
            self.memory.initialized_count()
        );
        Ok(())
    }
}

impl Engine {
    /// `EXIT` steps `pc` past the end of the program instead of raising,
    /// so the dispatch loop exits on its ordinary bounds check and the
    /// caller's stats snapshot still runs.
    pub fn terminated_normally(&self) -> bool {
        self.pc >= self.instructions.len()
    }
}

fn char_at(s: &str, index: i64) -> Option<char> {
    usize::try_from(index).ok().and_then(|i| s.chars().nth(i))
}

fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Some(true),
        (Value::Nil, _) | (_, Value::Nil) => Some(false),
        (Value::Int(x), Value::Int(y)) => Some(x == y),
        (Value::Float(x), Value::Float(y)) => Some(x == y),
        (Value::Bool(x), Value::Bool(y)) => Some(x == y),
        (Value::String(x), Value::String(y)) => Some(x == y),
        _ => None,
    }
}

fn parse_read_value(type_tag: &str, text: &str) -> Option<Value> {
    match type_tag {
        "int" => text.parse::<i64>().ok().map(Value::Int),
        "float" => crate::value::parse_hexfloat(text)
            .or_else(|| text.parse::<f64>().ok())
            .map(Value::Float),
        "bool" => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "string" => Some(Value::String(text.to_string())),
        _ => None,
    }
}
