use std::io::Cursor;

fn xml(body: &str) -> String {
    format!(r#"<program language="IPPcode21">{}</program>"#, body)
}

fn run(src: &str) -> (i32, String) {
    let mut input = Cursor::new(Vec::new());
    let mut output = Vec::new();
    let outcome = ippcode::run_str(src, &mut input, &mut output).unwrap();
    (outcome.return_code, String::from_utf8(output).unwrap())
}

#[test]
fn hello_world() {
    let src = xml(
        r#"
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@x</arg1></instruction>
        <instruction order="2" opcode="MOVE"><arg1 type="var">GF@x</arg1><arg2 type="string">Hello</arg2></instruction>
        <instruction order="3" opcode="WRITE"><arg1 type="var">GF@x</arg1></instruction>
        "#,
    );
    let (code, stdout) = run(&src);
    assert_eq!(stdout, "Hello");
    assert_eq!(code, 0);
}

#[test]
fn arithmetic_with_type_mismatch_is_fatal() {
    let src = xml(
        r#"
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@r</arg1></instruction>
        <instruction order="2" opcode="ADD"><arg1 type="var">GF@r</arg1><arg2 type="int">1</arg2><arg3 type="string">2</arg3></instruction>
        "#,
    );
    let mut input = Cursor::new(Vec::new());
    let mut output = Vec::new();
    let err = ippcode::run_str(&src, &mut input, &mut output).unwrap_err();
    assert_eq!(err.exit_code(), 53);
    assert!(output.is_empty());
}

#[test]
fn integer_division_by_zero_is_fatal() {
    let src = xml(
        r#"
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@r</arg1></instruction>
        <instruction order="2" opcode="IDIV"><arg1 type="var">GF@r</arg1><arg2 type="int">5</arg2><arg3 type="int">0</arg3></instruction>
        "#,
    );
    let mut input = Cursor::new(Vec::new());
    let mut output = Vec::new();
    let err = ippcode::run_str(&src, &mut input, &mut output).unwrap_err();
    assert_eq!(err.exit_code(), 57);
}

#[test]
fn frames_round_trip() {
    let src = xml(
        r#"
        <instruction order="1" opcode="CREATEFRAME"></instruction>
        <instruction order="2" opcode="DEFVAR"><arg1 type="var">TF@a</arg1></instruction>
        <instruction order="3" opcode="PUSHFRAME"></instruction>
        <instruction order="4" opcode="DEFVAR"><arg1 type="var">LF@a</arg1></instruction>
        <instruction order="5" opcode="MOVE"><arg1 type="var">LF@a</arg1><arg2 type="int">7</arg2></instruction>
        <instruction order="6" opcode="POPFRAME"></instruction>
        <instruction order="7" opcode="WRITE"><arg1 type="var">TF@a</arg1></instruction>
        "#,
    );
    let (code, stdout) = run(&src);
    assert_eq!(stdout, "7");
    assert_eq!(code, 0);
}

#[test]
fn call_return_loop_tracks_insts_and_hot() {
    let src = xml(
        r#"
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@i</arg1></instruction>
        <instruction order="2" opcode="MOVE"><arg1 type="var">GF@i</arg1><arg2 type="int">0</arg2></instruction>
        <instruction order="3" opcode="CALL"><arg1 type="label">L</arg1></instruction>
        <instruction order="4" opcode="CALL"><arg1 type="label">L</arg1></instruction>
        <instruction order="5" opcode="EXIT"><arg1 type="int">0</arg1></instruction>
        <instruction order="6" opcode="LABEL"><arg1 type="label">L</arg1></instruction>
        <instruction order="7" opcode="ADD"><arg1 type="var">GF@i</arg1><arg2 type="var">GF@i</arg2><arg3 type="int">1</arg3></instruction>
        <instruction order="8" opcode="RETURN"></instruction>
        "#,
    );
    let mut input = Cursor::new(Vec::new());
    let mut output = Vec::new();
    let outcome = ippcode::run_str(&src, &mut input, &mut output).unwrap();
    assert_eq!(outcome.return_code, 0);
    assert_eq!(outcome.stats.hot(), 7);
    assert_eq!(outcome.stats.insts(), 9);
}

#[test]
fn eq_with_nil() {
    let src = xml(
        r#"
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@r</arg1></instruction>
        <instruction order="2" opcode="EQ"><arg1 type="var">GF@r</arg1><arg2 type="nil">nil</arg2><arg3 type="int">0</arg3></instruction>
        <instruction order="3" opcode="WRITE"><arg1 type="var">GF@r</arg1></instruction>
        "#,
    );
    let (_, stdout) = run(&src);
    assert_eq!(stdout, "false");

    let src = xml(
        r#"
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@r</arg1></instruction>
        <instruction order="2" opcode="EQ"><arg1 type="var">GF@r</arg1><arg2 type="nil">nil</arg2><arg3 type="nil">nil</arg3></instruction>
        <instruction order="3" opcode="WRITE"><arg1 type="var">GF@r</arg1></instruction>
        "#,
    );
    let (_, stdout) = run(&src);
    assert_eq!(stdout, "true");
}

#[test]
fn float_literal_round_trips_through_write() {
    let src = xml(
        r#"
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@x</arg1></instruction>
        <instruction order="2" opcode="MOVE"><arg1 type="var">GF@x</arg1><arg2 type="float">0x1.921fb54442d18p+1</arg2></instruction>
        <instruction order="3" opcode="WRITE"><arg1 type="var">GF@x</arg1></instruction>
        "#,
    );
    let (_, stdout) = run(&src);
    assert_eq!(ippcode::value::parse_hexfloat(&stdout).unwrap(), std::f64::consts::PI);
}
