/// Upper bound (inclusive) accepted by the `EXIT` instruction, chosen to
/// stay clear of the interpreter's own reserved exit codes (50 and up).
pub const EXIT_CODE_MAX: i64 = 49;

const NAME_EXTRA: &str = "_-$&%*!?";

pub fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || NAME_EXTRA.contains(c)
}

pub fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || NAME_EXTRA.contains(c)
}

pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_continue),
        _ => false,
    }
}
