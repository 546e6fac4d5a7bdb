use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use ippcode_util::EnumFromStr;
use log::debug;

use crate::error::{Error, Result};
use crate::instructions::{ArgRole, Instruction, OpCode};
use crate::operand::{decode_string_escapes, parse_var_ref, Operand};
use crate::value::{parse_hexfloat, Value};

/// The outcome of loading an XML program: an ordered instruction list
/// and the label index it resolves against.
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
}

struct RawArg {
    index: u32,
    type_attr: String,
    text: String,
}

struct RawInstruction {
    order: u32,
    opcode_text: String,
    args: Vec<RawArg>,
}

/// Parses and validates `xml`: root element `program` with a
/// `language="IPPcode21"` attribute (case insensitive), `instruction`
/// children with contiguous `arg1..argN` children matching each opcode's
/// declared roles.
pub fn load(xml: &str) -> Result<Program> {
    let raw = parse_xml(xml)?;
    let instructions = decode_instructions(raw)?;
    for ins in &instructions {
        debug!("parsed instruction {} {:?} args={:?}", ins.order, ins.opcode, ins.args);
    }
    let labels = index_labels(&instructions)?;
    debug!("label index built with {} entr{}", labels.len(), if labels.len() == 1 { "y" } else { "ies" });
    verify_jump_targets(&instructions, &labels)?;
    Ok(Program { instructions, labels })
}

fn parse_xml(xml: &str) -> Result<Vec<RawInstruction>> {
    // Leave whitespace untouched: a string literal may be all whitespace,
    // or carry meaningful leading/trailing spaces. Whitespace-only text
    // between elements is simply ignored below since it never matches a
    // Start/Empty/End/Eof arm; non-string operand branches trim explicitly.
    let mut reader = Reader::from_str(xml);

    let mut buf = Vec::new();
    let mut seen_root = false;
    let mut raw_instructions = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| Error::XmlMalformed(e.to_string()))? {
            Event::Start(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                if name == "program" {
                    if seen_root {
                        return Err(Error::Structure("duplicate <program> root".to_string()));
                    }
                    seen_root = true;
                    let language = attr(&tag, "language")?;
                    if !language.eq_ignore_ascii_case("ippcode21") {
                        return Err(Error::Structure(format!(
                            "unsupported language attribute '{}'",
                            language
                        )));
                    }
                } else if name == "instruction" {
                    if !seen_root {
                        return Err(Error::Structure("<instruction> outside <program>".to_string()));
                    }
                    let (order, opcode_text) = instruction_header(&tag)?;
                    raw_instructions.push(parse_instruction_body(&mut reader, order, opcode_text)?);
                } else {
                    return Err(Error::Structure(format!("unexpected element '{}'", name)));
                }
            }
            Event::Empty(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                if name != "instruction" {
                    return Err(Error::Structure(format!("unexpected empty element '{}'", name)));
                }
                if !seen_root {
                    return Err(Error::Structure("<instruction> outside <program>".to_string()));
                }
                let (order, opcode_text) = instruction_header(&tag)?;
                raw_instructions.push(RawInstruction {
                    order,
                    opcode_text,
                    args: Vec::new(),
                });
            }
            Event::End(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                if name == "program" {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(Error::Structure("missing <program> root element".to_string()));
    }

    Ok(raw_instructions)
}

/// Reads the `arg1..argN` children of an already-opened `<instruction>`
/// element until its matching close tag.
fn parse_instruction_body(
    reader: &mut Reader<&[u8]>,
    order: u32,
    opcode_text: String,
) -> Result<RawInstruction> {
    let mut buf = Vec::new();
    let mut args = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| Error::XmlMalformed(e.to_string()))? {
            Event::Start(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                let index = arg_index(&name)?;
                let type_attr = attr(&tag, "type")?;
                let text = read_text_until_close(reader)?;
                args.push(RawArg { index, type_attr, text });
            }
            Event::Empty(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                let index = arg_index(&name)?;
                let type_attr = attr(&tag, "type")?;
                args.push(RawArg {
                    index,
                    type_attr,
                    text: String::new(),
                });
            }
            Event::End(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                if name == "instruction" {
                    break;
                }
            }
            Event::Eof => return Err(Error::XmlMalformed("unexpected end of document".to_string())),
            _ => {}
        }
        buf.clear();
    }

    args.sort_by_key(|a| a.index);
    Ok(RawInstruction { order, opcode_text, args })
}

fn read_text_until_close(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| Error::XmlMalformed(e.to_string()))? {
            Event::Text(t) => {
                text.push_str(
                    &t.unescape()
                        .map_err(|e| Error::XmlMalformed(e.to_string()))?,
                );
            }
            Event::CData(t) => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(_) => break,
            Event::Eof => return Err(Error::XmlMalformed("unexpected end of document".to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

fn instruction_header(tag: &quick_xml::events::BytesStart) -> Result<(u32, String)> {
    let order = attr(tag, "order")?
        .parse::<i64>()
        .map_err(|_| Error::Structure("order attribute is not an integer".to_string()))?;
    if order <= 0 {
        return Err(Error::Structure("order attribute must be positive".to_string()));
    }
    let opcode_text = attr(tag, "opcode")?.to_uppercase();
    Ok((order as u32, opcode_text))
}

fn arg_index(tag_name: &str) -> Result<u32> {
    tag_name
        .strip_prefix("arg")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|&n| n >= 1)
        .ok_or_else(|| Error::Structure(format!("unexpected argument element '{}'", tag_name)))
}

fn attr(tag: &quick_xml::events::BytesStart, name: &str) -> Result<String> {
    for a in tag.attributes() {
        let a = a.map_err(|e| Error::XmlMalformed(e.to_string()))?;
        if a.key.as_ref() == name.as_bytes() {
            return Ok(a
                .unescape_value()
                .map_err(|e| Error::XmlMalformed(e.to_string()))?
                .to_string());
        }
    }
    Err(Error::Structure(format!("missing required attribute '{}'", name)))
}

fn decode_instructions(raw: Vec<RawInstruction>) -> Result<Vec<Instruction>> {
    let mut sorted = raw;
    sorted.sort_by_key(|i| i.order);
    for pair in sorted.windows(2) {
        if pair[0].order == pair[1].order {
            return Err(Error::Structure(format!(
                "duplicate instruction order {}",
                pair[0].order
            )));
        }
    }

    sorted.into_iter().map(decode_instruction).collect()
}

fn decode_instruction(raw: RawInstruction) -> Result<Instruction> {
    let opcode = OpCode::from_str(&raw.opcode_text)
        .map_err(|_| Error::Structure(format!("unknown opcode '{}'", raw.opcode_text)))?;

    let roles = opcode.roles();
    if raw.args.len() != roles.len() {
        return Err(Error::Structure(format!(
            "{} expects {} argument(s), found {}",
            raw.opcode_text,
            roles.len(),
            raw.args.len()
        )));
    }
    for (i, a) in raw.args.iter().enumerate() {
        if a.index as usize != i + 1 {
            return Err(Error::Structure(format!(
                "argument elements must be contiguous arg1..arg{}",
                roles.len()
            )));
        }
    }

    let args = raw
        .args
        .iter()
        .zip(roles.iter())
        .map(|(a, role)| decode_operand(a, *role))
        .collect::<Result<Vec<_>>>()?;

    Ok(Instruction {
        order: raw.order,
        opcode,
        args,
        exec_count: 0,
    })
}

fn decode_operand(arg: &RawArg, role: ArgRole) -> Result<Operand> {
    match role {
        ArgRole::Var => {
            if arg.type_attr != "var" {
                return Err(Error::Structure(format!(
                    "expected type='var', found '{}'",
                    arg.type_attr
                )));
            }
            Ok(Operand::Var(parse_var_ref(arg.text.trim())?))
        }
        ArgRole::Label => {
            if arg.type_attr != "label" {
                return Err(Error::Structure(format!(
                    "expected type='label', found '{}'",
                    arg.type_attr
                )));
            }
            Ok(Operand::Label(arg.text.trim().to_string()))
        }
        ArgRole::Type => {
            if arg.type_attr != "type" {
                return Err(Error::Structure(format!(
                    "expected type='type', found '{}'",
                    arg.type_attr
                )));
            }
            let tag = arg.text.trim();
            if !matches!(tag, "int" | "string" | "bool" | "float") {
                return Err(Error::Structure(format!("unknown type tag '{}'", tag)));
            }
            Ok(Operand::Type(tag.to_string()))
        }
        ArgRole::Symb => decode_symb(arg),
    }
}

fn decode_symb(arg: &RawArg) -> Result<Operand> {
    match arg.type_attr.as_str() {
        "var" => Ok(Operand::Var(parse_var_ref(arg.text.trim())?)),
        "int" => {
            let i: i64 = arg
                .text
                .trim()
                .parse()
                .map_err(|_| Error::Structure(format!("invalid int literal '{}'", arg.text)))?;
            Ok(Operand::Literal(Value::Int(i)))
        }
        "float" => {
            let f = parse_hexfloat(arg.text.trim())
                .ok_or_else(|| Error::Structure(format!("invalid float literal '{}'", arg.text)))?;
            Ok(Operand::Literal(Value::Float(f)))
        }
        "bool" => match arg.text.trim() {
            "true" => Ok(Operand::Literal(Value::Bool(true))),
            "false" => Ok(Operand::Literal(Value::Bool(false))),
            other => Err(Error::Structure(format!("invalid bool literal '{}'", other))),
        },
        "nil" => {
            if arg.text.trim() != "nil" {
                return Err(Error::Structure(format!("invalid nil literal '{}'", arg.text)));
            }
            Ok(Operand::Literal(Value::Nil))
        }
        "string" => Ok(Operand::Literal(Value::String(decode_string_escapes(&arg.text)))),
        other => Err(Error::Structure(format!("invalid symbol type '{}'", other))),
    }
}

fn index_labels(instructions: &[Instruction]) -> Result<HashMap<String, usize>> {
    let mut labels = HashMap::new();
    for (idx, ins) in instructions.iter().enumerate() {
        if ins.opcode == OpCode::LABEL {
            let name = ins.args[0].as_label().to_string();
            if labels.insert(name.clone(), idx).is_some() {
                return Err(Error::Semantic(format!("label '{}' redefined", name)));
            }
        }
    }
    Ok(labels)
}

fn verify_jump_targets(instructions: &[Instruction], labels: &HashMap<String, usize>) -> Result<()> {
    for ins in instructions {
        if matches!(
            ins.opcode,
            OpCode::CALL | OpCode::JUMP | OpCode::JUMPIFEQ | OpCode::JUMPIFNEQ
        ) {
            let target = ins.args[0].as_label();
            if !labels.contains_key(target) {
                return Err(Error::Semantic(format!("undefined label '{}'", target)));
            }
        }
    }
    Ok(())
}
