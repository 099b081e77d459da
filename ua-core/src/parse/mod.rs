//! Tokenizer + parser (spec.md §4.2): turns preprocessed text into a flat
//! IR sequence. The grammar is shape-table driven (`crate::shapes`) except
//! for `VAR`/`SET`/`GET`/`CALL`/function-definitions, which spec.md calls
//! out as "specials handled out-of-table" and are parsed by hand below.

use crate::diag::{SyntaxError, UaError};
use crate::ir::{
    BoundedString, CallArg, Instruction, Operand, OperandType, Opcode, SourcePos, MAX_PARAMS,
};
use crate::shapes::shape_of;

/// Parse a full preprocessed source text into the IR array.
pub fn parse(text: &str) -> Result<Vec<Instruction>, UaError> {
    let mut out = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = (idx + 1) as u32;
        let stripped = strip_comment(raw_line);
        let line = stripped.trim();
        if line.is_empty() {
            continue;
        }
        out.push(parse_line(line, line_no)?);
    }
    Ok(out)
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_line(line: &str, line_no: u32) -> Result<Instruction, UaError> {
    let pos = SourcePos { line: line_no, col: 1 };

    if let Some(rest) = line.strip_suffix(':') {
        return parse_definition(rest, pos);
    }

    // name(args) with no mnemonic and no trailing colon: function-call sugar.
    if let Some(first_space) = line.find(char::is_whitespace) {
        let candidate = &line[..first_space];
        if Opcode::from_mnemonic(candidate).is_none() && is_call_sugar(line) {
            return parse_call_sugar(line, pos);
        }
    } else if Opcode::from_mnemonic(line).is_none() && is_call_sugar(line) {
        return parse_call_sugar(line, pos);
    }

    let (mnemonic, rest) = split_first_token(line);
    let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| {
        UaError::Syntax(SyntaxError::UnknownOpcode {
            mnemonic: mnemonic.to_string(),
            line: line_no,
            col: 1,
        })
    })?;

    match opcode {
        Opcode::Var => parse_var(rest, pos),
        Opcode::Set => parse_set(rest, pos),
        Opcode::Get => parse_get(rest, pos),
        Opcode::Buffer => parse_buffer(rest, pos),
        Opcode::Call => parse_call_stmt(rest, pos),
        _ => parse_generic(opcode, rest, pos),
    }
}

fn is_call_sugar(line: &str) -> bool {
    line.ends_with(')') && line.contains('(')
}

fn parse_call_sugar(line: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let open = line.find('(').unwrap();
    let name = line[..open].trim();
    let args_str = &line[open + 1..line.len() - 1];
    let name = BoundedString::ident(name).map_err(to_ident_err(pos))?;
    let call_args = parse_call_args(args_str, pos)?;
    Ok(Instruction::Op {
        opcode: Opcode::Call,
        operands: vec![Operand::LabelRef(name)],
        pos,
        call_args: Some(call_args),
    })
}

fn parse_call_stmt(rest: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(UaError::Syntax(SyntaxError::MissingOperand {
            opcode: "CALL".to_string(),
            index: 0,
            line: pos.line,
            col: pos.col,
        }));
    }
    if rest.ends_with(')') && rest.contains('(') {
        let open = rest.find('(').unwrap();
        let name = rest[..open].trim();
        let args_str = &rest[open + 1..rest.len() - 1];
        let name = BoundedString::ident(name).map_err(to_ident_err(pos))?;
        let call_args = parse_call_args(args_str, pos)?;
        return Ok(Instruction::Op {
            opcode: Opcode::Call,
            operands: vec![Operand::LabelRef(name)],
            pos,
            call_args: Some(call_args),
        });
    }
    let name = BoundedString::ident(rest).map_err(to_ident_err(pos))?;
    Ok(Instruction::Op {
        opcode: Opcode::Call,
        operands: vec![Operand::LabelRef(name)],
        pos,
        call_args: None,
    })
}

fn parse_call_args(args_str: &str, pos: SourcePos) -> Result<Vec<CallArg>, UaError> {
    let mut out = Vec::new();
    for tok in split_operands(args_str) {
        let tok = tok.trim();
        if tok.is_empty() {
            continue;
        }
        if let Some(n) = parse_register_token(tok) {
            out.push(CallArg::Register(n));
        } else if let Some(rest) = tok.strip_prefix('#') {
            let v = parse_integer(rest).ok_or_else(|| bad_operand("CALL", pos, tok))?;
            out.push(CallArg::Immediate(v));
        } else {
            let ident = BoundedString::ident(tok).map_err(to_ident_err(pos))?;
            out.push(CallArg::Ident(ident));
        }
    }
    Ok(out)
}

fn parse_definition(rest: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let rest = rest.trim();
    if let Some(open) = rest.find('(') {
        if !rest.ends_with(')') {
            return Err(UaError::Syntax(SyntaxError::ExtraTokens {
                opcode: "label".to_string(),
                line: pos.line,
                col: pos.col,
                near: rest.to_string(),
            }));
        }
        let name = rest[..open].trim();
        let params_str = &rest[open + 1..rest.len() - 1];
        let name = BoundedString::ident(name).map_err(to_ident_err(pos))?;
        let mut params = Vec::new();
        for p in params_str.split(',') {
            let p = p.trim();
            if p.is_empty() {
                continue;
            }
            params.push(BoundedString::ident(p).map_err(to_ident_err(pos))?);
        }
        if params.len() > MAX_PARAMS {
            return Err(UaError::Syntax(SyntaxError::ParamOverflow {
                name: name.to_string(),
                max: MAX_PARAMS,
                line: pos.line,
                col: pos.col,
            }));
        }
        Ok(Instruction::LabelDef {
            name,
            params: Some(params),
            pos,
        })
    } else {
        let name = BoundedString::ident(rest).map_err(to_ident_err(pos))?;
        Ok(Instruction::LabelDef {
            name,
            params: None,
            pos,
        })
    }
}

fn parse_var(rest: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let parts = split_operands(rest);
    if parts.is_empty() || parts[0].trim().is_empty() {
        return Err(UaError::Syntax(SyntaxError::MissingOperand {
            opcode: "VAR".to_string(),
            index: 0,
            line: pos.line,
            col: pos.col,
        }));
    }
    let name = BoundedString::ident(parts[0].trim()).map_err(to_ident_err(pos))?;
    let mut operands = vec![Operand::LabelRef(name)];
    if parts.len() > 1 {
        let init = parse_operand_token(parts[1].trim(), pos)?;
        if !matches!(init, Operand::Immediate(_)) {
            return Err(bad_operand("VAR", pos, &parts[1]));
        }
        operands.push(init);
    }
    if parts.len() > 2 {
        return Err(UaError::Syntax(SyntaxError::ExtraTokens {
            opcode: "VAR".to_string(),
            line: pos.line,
            col: pos.col,
            near: parts[2].clone(),
        }));
    }
    Ok(Instruction::Op {
        opcode: Opcode::Var,
        operands,
        pos,
        call_args: None,
    })
}

fn parse_buffer(rest: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let parts = split_operands(rest);
    if parts.len() != 2 {
        return Err(UaError::Syntax(SyntaxError::MissingOperand {
            opcode: "BUFFER".to_string(),
            index: parts.len(),
            line: pos.line,
            col: pos.col,
        }));
    }
    let name = BoundedString::ident(parts[0].trim()).map_err(to_ident_err(pos))?;
    let len = parse_operand_token(parts[1].trim(), pos)?;
    if !matches!(len, Operand::Immediate(_)) {
        return Err(bad_operand("BUFFER", pos, &parts[1]));
    }
    Ok(Instruction::Op {
        opcode: Opcode::Buffer,
        operands: vec![Operand::LabelRef(name), len],
        pos,
        call_args: None,
    })
}

fn parse_set(rest: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let parts = split_operands(rest);
    if parts.len() != 2 {
        return Err(UaError::Syntax(SyntaxError::MissingOperand {
            opcode: "SET".to_string(),
            index: parts.len(),
            line: pos.line,
            col: pos.col,
        }));
    }
    let name = BoundedString::ident(parts[0].trim()).map_err(to_ident_err(pos))?;
    let value = parse_operand_token(parts[1].trim(), pos)?;
    if !matches!(value, Operand::Register(_) | Operand::Immediate(_)) {
        return Err(bad_operand("SET", pos, &parts[1]));
    }
    Ok(Instruction::Op {
        opcode: Opcode::Set,
        operands: vec![Operand::LabelRef(name), value],
        pos,
        call_args: None,
    })
}

fn parse_get(rest: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let parts = split_operands(rest);
    if parts.len() != 2 {
        return Err(UaError::Syntax(SyntaxError::MissingOperand {
            opcode: "GET".to_string(),
            index: parts.len(),
            line: pos.line,
            col: pos.col,
        }));
    }
    let reg = parse_operand_token(parts[0].trim(), pos)?;
    if !matches!(reg, Operand::Register(_)) {
        return Err(bad_operand("GET", pos, &parts[0]));
    }
    let name = BoundedString::ident(parts[1].trim()).map_err(to_ident_err(pos))?;
    Ok(Instruction::Op {
        opcode: Opcode::Get,
        operands: vec![reg, Operand::LabelRef(name)],
        pos,
        call_args: None,
    })
}

fn parse_generic(opcode: Opcode, rest: &str, pos: SourcePos) -> Result<Instruction, UaError> {
    let shape = shape_of(opcode);
    let parts: Vec<String> = if rest.trim().is_empty() {
        Vec::new()
    } else {
        split_operands(rest)
    };

    if parts.len() < shape.arity {
        return Err(UaError::Syntax(SyntaxError::MissingOperand {
            opcode: opcode.mnemonic().to_string(),
            index: parts.len(),
            line: pos.line,
            col: pos.col,
        }));
    }
    if parts.len() > shape.arity {
        return Err(UaError::Syntax(SyntaxError::ExtraTokens {
            opcode: opcode.mnemonic().to_string(),
            line: pos.line,
            col: pos.col,
            near: parts[shape.arity..].join(", "),
        }));
    }

    let mut operands = Vec::with_capacity(shape.arity);
    for (i, tok) in parts.iter().enumerate() {
        let operand = parse_operand_token(tok.trim(), pos)?;
        let declared = shape.operands[i];
        if !declared.accepts(operand.type_of()) {
            return Err(bad_operand(opcode.mnemonic(), pos, tok));
        }
        operands.push(operand);
    }

    Ok(Instruction::Op {
        opcode,
        operands,
        pos,
        call_args: None,
    })
}

fn parse_operand_token(tok: &str, pos: SourcePos) -> Result<Operand, UaError> {
    if tok.starts_with('"') && tok.ends_with('"') && tok.len() >= 2 {
        let inner = &tok[1..tok.len() - 1];
        return Ok(Operand::StringLit(
            BoundedString::string_lit(inner).map_err(to_ident_err(pos))?,
        ));
    }
    if let Some(n) = parse_register_token(tok) {
        return Ok(Operand::Register(n));
    }
    if let Some(v) = parse_integer(tok) {
        return Ok(Operand::Immediate(v));
    }
    if is_ident(tok) {
        return Ok(Operand::LabelRef(
            BoundedString::ident(tok).map_err(to_ident_err(pos))?,
        ));
    }
    Err(UaError::Syntax(SyntaxError::BadOperandType {
        opcode: String::new(),
        line: pos.line,
        col: pos.col,
        near: tok.to_string(),
    }))
}

fn parse_register_token(tok: &str) -> Option<u8> {
    let tok = tok.trim();
    let rest = tok.strip_prefix('R').or_else(|| tok.strip_prefix('r'))?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = rest.parse().ok()?;
    if n <= 15 {
        Some(n as u8)
    } else {
        None
    }
}

/// Decimal, `0x`-hex, or `#`-prefixed immediates (spec.md §6).
fn parse_integer(tok: &str) -> Option<i64> {
    let tok = tok.trim();
    let (neg, tok) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    let tok = tok.strip_prefix('#').unwrap_or(tok);
    let value = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit()) {
        tok.parse().ok()?
    } else {
        return None;
    };
    Some(if neg { -value } else { value })
}

fn is_ident(tok: &str) -> bool {
    let mut chars = tok.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn split_first_token(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim_start()),
        None => (line, ""),
    }
}

/// Comma-split that respects double-quoted spans (so a string literal
/// operand may itself contain commas).
fn split_operands(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                cur.push(c);
            }
            ',' if !in_quotes => {
                out.push(cur.trim().to_string());
                cur.clear();
            }
            _ => cur.push(c),
        }
    }
    if !cur.trim().is_empty() || !out.is_empty() {
        out.push(cur.trim().to_string());
    }
    out
}

fn bad_operand(opcode: &str, pos: SourcePos, near: &str) -> UaError {
    UaError::Syntax(SyntaxError::BadOperandType {
        opcode: opcode.to_string(),
        line: pos.line,
        col: pos.col,
        near: near.to_string(),
    })
}

fn to_ident_err(pos: SourcePos) -> impl Fn(crate::ir::IrError) -> UaError {
    move |e| {
        UaError::Syntax(SyntaxError::BadOperandType {
            opcode: String::new(),
            line: pos.line,
            col: pos.col,
            near: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_arithmetic() {
        let ir = parse("LDI R0, 10\nLDI R1, 5\nADD R0, R1\nHLT\n").unwrap();
        assert_eq!(ir.len(), 4);
        match &ir[2] {
            Instruction::Op { opcode, operands, .. } => {
                assert_eq!(*opcode, Opcode::Add);
                assert_eq!(operands[0], Operand::Register(0));
                assert_eq!(operands[1], Operand::Register(1));
            }
            _ => panic!("expected Op"),
        }
    }

    #[test]
    fn parses_hex_and_hash_immediates() {
        let ir = parse("LDI R0, 0x10\nLDI R1, #5\n").unwrap();
        assert_eq!(
            ir[0],
            Instruction::Op {
                opcode: Opcode::Ldi,
                operands: vec![Operand::Register(0), Operand::Immediate(16)],
                pos: SourcePos { line: 1, col: 1 },
                call_args: None,
            }
        );
        assert_eq!(
            ir[1],
            Instruction::Op {
                opcode: Opcode::Ldi,
                operands: vec![Operand::Register(1), Operand::Immediate(5)],
                pos: SourcePos { line: 2, col: 1 },
                call_args: None,
            }
        );
    }

    #[test]
    fn parses_label_and_function_definitions() {
        let ir = parse("start:\nadd(a, b):\nRET\n").unwrap();
        match &ir[0] {
            Instruction::LabelDef { name, params, .. } => {
                assert_eq!(name.as_str(), "start");
                assert!(params.is_none());
            }
            _ => panic!(),
        }
        match &ir[1] {
            Instruction::LabelDef { name, params, .. } => {
                assert_eq!(name.as_str(), "add");
                assert_eq!(params.as_ref().unwrap().len(), 2);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn parses_call_sugar_with_args() {
        let ir = parse("add(R0, #5, x)\n").unwrap();
        match &ir[0] {
            Instruction::Op {
                opcode,
                operands,
                call_args,
                ..
            } => {
                assert_eq!(*opcode, Opcode::Call);
                assert_eq!(operands[0], Operand::LabelRef(BoundedString::ident("add").unwrap()));
                let args = call_args.as_ref().unwrap();
                assert_eq!(args[0], CallArg::Register(0));
                assert_eq!(args[1], CallArg::Immediate(5));
                assert_eq!(args[2], CallArg::Ident(BoundedString::ident("x").unwrap()));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn var_and_set_get_buffer() {
        let ir = parse("VAR total, 0\nSET total, R0\nGET R1, total\nBUFFER scratch, 64\n").unwrap();
        assert_eq!(ir.len(), 4);
        assert!(matches!(ir[0], Instruction::Op { opcode: Opcode::Var, .. }));
        assert!(matches!(ir[1], Instruction::Op { opcode: Opcode::Set, .. }));
        assert!(matches!(ir[2], Instruction::Op { opcode: Opcode::Get, .. }));
        assert!(matches!(ir[3], Instruction::Op { opcode: Opcode::Buffer, .. }));
    }

    #[test]
    fn unknown_opcode_is_a_syntax_error() {
        let err = parse("FROB R0, R1\n");
        assert!(matches!(err, Err(UaError::Syntax(SyntaxError::UnknownOpcode { .. }))));
    }

    #[test]
    fn missing_operand_is_a_syntax_error() {
        let err = parse("ADD R0\n");
        assert!(matches!(err, Err(UaError::Syntax(SyntaxError::MissingOperand { .. }))));
    }

    #[test]
    fn comments_are_stripped() {
        let ir = parse("NOP ; this is a comment\nHLT\n").unwrap();
        assert_eq!(ir.len(), 2);
    }

    #[test]
    fn lds_accepts_string_literal() {
        let ir = parse("LDS R0, \"hi, there\"\n").unwrap();
        match &ir[0] {
            Instruction::Op { operands, .. } => {
                assert_eq!(operands[1], Operand::StringLit(BoundedString::string_lit("hi, there").unwrap()));
            }
            _ => panic!(),
        }
    }
}
