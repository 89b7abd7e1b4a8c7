//! # Key Map
//!
//! Abstract key identities and how they line up with the pitch index space.
//!
//! ## Key Order
//! [`KEY_ORDER`] lists every key of the on-screen keyboard (main rows, then the numpad),
//! each code once, in reading order. A code's position in this list is its pitch index.
//! Codes outside the list hash into it, so every code resolves to *some* index.
//!
//! ## Code Normalization
//! Input layers deliver either layout codes (`"A"`, `" "`, `"Shift"`) or DOM-style
//! codes (`"KeyA"`, `"Space"`, `"ShiftLeft"`). [`normalize_code`] folds the latter onto
//! the former before any lookup.
//!
//! ## Typing
//! [`code_to_char`] is the view-side mapping used for display sequences and typed text:
//! action keys read as a space, printable keys as themselves. [`char_to_code`] goes the
//! other way for text entered as plain characters.

use std::borrow::Cow;

/// Every key of the layout, in index order.
pub const KEY_ORDER: [&str; 77] = [
    // number row
    "`", "1", "2", "3", "4", "5", "6", "7", "8", "9", "0", "-", "=", "Backspace",
    // top row
    "Tab", "Q", "W", "E", "R", "T", "Y", "U", "I", "O", "P", "[", "]", "\\",
    // home row
    "CapsLock", "A", "S", "D", "F", "G", "H", "J", "K", "L", ";", "'", "Enter",
    // bottom row
    "Shift", "Z", "X", "C", "V", "B", "N", "M", ",", ".", "/",
    // modifiers
    "Control", "Fn", "Alt", " ", "ArrowLeft", "ArrowUp", "ArrowDown", "ArrowRight",
    // numpad
    "NumLock", "NumpadDivide", "NumpadMultiply", "NumpadSubtract",
    "Numpad7", "Numpad8", "Numpad9", "NumpadAdd",
    "Numpad4", "Numpad5", "Numpad6",
    "Numpad1", "Numpad2", "Numpad3", "NumpadEnter",
    "Numpad0", "NumpadDecimal",
];

/// Keys that type as a space in the "spell a song" view.
const ACTION_KEYS: [&str; 19] = [
    "Backspace",
    "Tab",
    "CapsLock",
    "Shift",
    "Control",
    "Alt",
    "Meta",
    "NumLock",
    "ScrollLock",
    "Pause",
    "Insert",
    "Delete",
    "Home",
    "End",
    "PageUp",
    "PageDown",
    "Enter",
    "ContextMenu",
    "Fn",
];

/// 32-bit polynomial string hash over UTF-16 code units: `h = h * 31 + unit`.
///
/// Wrapping `i32` arithmetic on purpose. Results must match the values recorded
/// in existing songs bit for bit.
pub fn polynomial_hash<'a, I>(parts: I) -> i32
where
    I: IntoIterator<Item = &'a str>,
{
    let mut h: i32 = 0;
    for part in parts {
        for unit in part.encode_utf16() {
            h = h.wrapping_mul(31).wrapping_add(unit as i32);
        }
    }
    h
}

/// Fold DOM-style key codes onto layout codes. Layout codes pass through unchanged.
pub fn normalize_code(code: &str) -> Cow<'_, str> {
    if let Some(letter) = code.strip_prefix("Key") {
        if letter.len() == 1 && letter.chars().all(|c| c.is_ascii_alphabetic()) {
            return Cow::Owned(letter.to_ascii_uppercase());
        }
    }
    if let Some(digit) = code.strip_prefix("Digit") {
        if digit.len() == 1 && digit.chars().all(|c| c.is_ascii_digit()) {
            return Cow::Owned(digit.to_string());
        }
    }
    if code.len() == 1 && code.chars().all(|c| c.is_ascii_lowercase()) {
        return Cow::Owned(code.to_ascii_uppercase());
    }

    let mapped = match code {
        "Space" => " ",
        "Backquote" => "`",
        "Minus" => "-",
        "Equal" => "=",
        "BracketLeft" => "[",
        "BracketRight" => "]",
        "Backslash" => "\\",
        "Semicolon" => ";",
        "Quote" => "'",
        "Comma" => ",",
        "Period" => ".",
        "Slash" => "/",
        "ShiftLeft" | "ShiftRight" => "Shift",
        "ControlLeft" | "ControlRight" => "Control",
        "AltLeft" | "AltRight" => "Alt",
        "MetaLeft" | "MetaRight" => "Meta",
        _ => return Cow::Borrowed(code),
    };
    Cow::Borrowed(mapped)
}

/// Position of `code` in [`KEY_ORDER`], if it is a layout key.
pub fn layout_position(code: &str) -> Option<usize> {
    let normalized = normalize_code(code);
    KEY_ORDER.iter().position(|k| *k == normalized.as_ref())
}

/// Pitch index for any code: its layout position, or a stable hash into the layout.
pub fn key_index(code: &str) -> usize {
    layout_position(code).unwrap_or_else(|| {
        let normalized = normalize_code(code);
        let h = polynomial_hash([normalized.as_ref()]);
        h.unsigned_abs() as usize % KEY_ORDER.len()
    })
}

/// Whether a code is an action key (typed as a space).
pub fn is_action_key(code: &str) -> bool {
    let normalized = normalize_code(code);
    ACTION_KEYS.contains(&normalized.as_ref()) || normalized.starts_with("Arrow")
}

/// Character a key types in the "spell a song" view, or `None` for keys that type nothing.
pub fn code_to_char(code: &str) -> Option<char> {
    let normalized = normalize_code(code);
    let code = normalized.as_ref();

    if code == " " || is_action_key(code) {
        return Some(' ');
    }

    if let Some(suffix) = code.strip_prefix("Numpad") {
        return Some(match suffix {
            "Decimal" => '.',
            "Add" => '+',
            "Subtract" => '-',
            "Multiply" => '*',
            "Divide" => '/',
            digit if digit.len() == 1 && digit.chars().all(|c| c.is_ascii_digit()) => {
                digit.chars().next().unwrap_or(' ')
            }
            _ => ' ',
        });
    }

    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if (' '..='~').contains(&c) => Some(c),
        _ => None,
    }
}

/// Display form of a code sequence: typed characters, or the raw code when a key types nothing.
pub fn to_display_sequence(codes: &[String]) -> Vec<String> {
    codes
        .iter()
        .map(|code| match code_to_char(code) {
            Some(c) => c.to_string(),
            None => code.clone(),
        })
        .collect()
}

/// Key code for a typed character. Letters map to their uppercase key.
pub fn char_to_code(c: char) -> Option<String> {
    match c {
        ' ' => Some(" ".to_string()),
        c if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase().to_string()),
        c if c.is_ascii_digit() => Some(c.to_string()),
        c if c.is_ascii_punctuation() => Some(c.to_string()),
        '\n' => Some("Enter".to_string()),
        '\t' => Some("Tab".to_string()),
        _ => None,
    }
}

/// Key codes for a string of text, skipping characters with no key.
pub fn text_to_codes(text: &str) -> Vec<String> {
    text.chars().filter_map(char_to_code).collect()
}
