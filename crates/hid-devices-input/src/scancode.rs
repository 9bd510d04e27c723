//! HID usage to PS/2 Set-2 scancode translation.

/// Set-2 codes for the eight modifier usages `0xE0..=0xE7`.
pub const MODIFIER_TO_SET2: [u8; 8] = [0x14, 0x12, 0x11, 0x1F, 0x14, 0x59, 0x11, 0x27];

/// Set-2 codes indexed by HID usage. Usages below `0x04` are not keys.
#[rustfmt::skip]
pub const USAGE_TO_SET2: [u8; 0x74] = [
    0x00, 0x00, 0xFC, 0x00, 0x1C, 0x32, 0x21, 0x23, 0x24, 0x2B, 0x34, 0x33, 0x43, 0x3B, 0x42, 0x4B,
    0x3A, 0x31, 0x44, 0x4D, 0x15, 0x2D, 0x1B, 0x2C, 0x3C, 0x2A, 0x1D, 0x22, 0x35, 0x1A, 0x16, 0x1E,
    0x26, 0x25, 0x2E, 0x36, 0x3D, 0x3E, 0x46, 0x45, 0x5A, 0x76, 0x66, 0x0D, 0x29, 0x4E, 0x55, 0x54,
    0x5B, 0x5D, 0x5D, 0x4C, 0x52, 0x0E, 0x41, 0x49, 0x4A, 0x58, 0x05, 0x06, 0x04, 0x0C, 0x03, 0x0B,
    0x83, 0x0A, 0x01, 0x09, 0x78, 0x07, 0x7C, 0x7E, 0x7E, 0x70, 0x6C, 0x7D, 0x71, 0x69, 0x7A, 0x74,
    0x6B, 0x72, 0x75, 0x77, 0x4A, 0x7C, 0x7B, 0x79, 0x5A, 0x69, 0x72, 0x7A, 0x6B, 0x73, 0x74, 0x6C,
    0x75, 0x7D, 0x70, 0x71, 0x61, 0x2F, 0x37, 0x0F, 0x08, 0x10, 0x18, 0x20, 0x28, 0x30, 0x38, 0x40,
    0x48, 0x50, 0x57, 0x5F,
];

pub const EXTENDED_PREFIX: u8 = 0xE0;
pub const BREAK_PREFIX: u8 = 0xF0;

pub const USAGE_PRINT_SCREEN: u8 = 0x46;
pub const USAGE_PAUSE: u8 = 0x48;
pub const USAGE_LEFT_CTRL: u8 = 0xE0;
pub const USAGE_RIGHT_CTRL: u8 = 0xE4;

fn is_modifier(usage: u8) -> bool {
    (0xE0..=0xE7).contains(&usage)
}

/// Keys whose make and break codes start with `E0`.
pub fn needs_extended_prefix(usage: u8) -> bool {
    if is_modifier(usage) {
        let index = usage - 0xE0;
        return index > 2 && index != 5;
    }
    matches!(usage, 0x46 | 0x49..=0x52 | 0x54 | 0x58 | 0x65 | 0x66) || usage >= 0x81
}

/// Single Set-2 code for a usage, without prefixes.
pub fn set2_code(usage: u8) -> Option<u8> {
    if is_modifier(usage) {
        return Some(MODIFIER_TO_SET2[usize::from(usage - 0xE0)]);
    }
    if usage < 0x04 {
        return None;
    }
    USAGE_TO_SET2
        .get(usize::from(usage))
        .copied()
        .filter(|&code| code != 0)
}

/// Keys that do not follow the `[E0] code` / `[E0] F0 code` pattern.
#[derive(Debug, Clone, Copy)]
pub struct SpecialSequence {
    pub usage: u8,
    pub make: &'static [u8],
    pub break_code: &'static [u8],
}

pub const SPECIAL_SEQUENCES: &[SpecialSequence] = &[
    SpecialSequence {
        usage: USAGE_PRINT_SCREEN,
        make: &[0xE0, 0x12, 0xE0, 0x7C],
        break_code: &[0xE0, 0xF0, 0x7C, 0xE0, 0xF0, 0x12],
    },
    SpecialSequence {
        usage: USAGE_PAUSE,
        make: &[0xE1, 0x14, 0x77, 0xE1, 0xF0, 0x14, 0xF0, 0x77],
        break_code: &[],
    },
];

/// Pause pressed while a Ctrl key is held.
pub const CTRL_BREAK_MAKE: &[u8] = &[0xE0, 0x7E, 0xE0, 0xF0, 0x7E];

pub fn special_sequence(usage: u8) -> Option<&'static SpecialSequence> {
    SPECIAL_SEQUENCES.iter().find(|seq| seq.usage == usage)
}

/// A translated key event. The longest Set-2 sequence is eight bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Set2Sequence {
    bytes: [u8; 8],
    len: u8,
}

impl Set2Sequence {
    fn from_slice(bytes: &[u8]) -> Self {
        let mut seq = Self::default();
        for &b in bytes {
            seq.push(b);
        }
        seq
    }

    fn push(&mut self, byte: u8) {
        self.bytes[usize::from(self.len)] = byte;
        self.len += 1;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds the Set-2 bytes for a key event. `None` when the usage has no PS/2 equivalent;
/// an empty sequence when the event is silent (Pause release).
pub fn translate(usage: u8, pressed: bool, ctrl_held: bool) -> Option<Set2Sequence> {
    if usage == USAGE_PAUSE && pressed && ctrl_held {
        return Some(Set2Sequence::from_slice(CTRL_BREAK_MAKE));
    }
    if let Some(special) = special_sequence(usage) {
        let bytes = if pressed {
            special.make
        } else {
            special.break_code
        };
        return Some(Set2Sequence::from_slice(bytes));
    }

    let code = set2_code(usage)?;
    let mut seq = Set2Sequence::default();
    if needs_extended_prefix(usage) {
        seq.push(EXTENDED_PREFIX);
    }
    if !pressed {
        seq.push(BREAK_PREFIX);
    }
    seq.push(code);
    Some(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_make_and_break() {
        assert_eq!(translate(0x04, true, false).unwrap().as_slice(), &[0x1C]);
        assert_eq!(translate(0x04, false, false).unwrap().as_slice(), &[0xF0, 0x1C]);
    }

    #[test]
    fn arrow_keys_are_extended() {
        assert_eq!(translate(0x50, true, false).unwrap().as_slice(), &[0xE0, 0x6B]);
        assert_eq!(
            translate(0x50, false, false).unwrap().as_slice(),
            &[0xE0, 0xF0, 0x6B]
        );
    }

    #[test]
    fn keypad_enter_and_slash_share_codes_with_main_block() {
        assert_eq!(translate(0x58, true, false).unwrap().as_slice(), &[0xE0, 0x5A]);
        assert_eq!(translate(0x28, true, false).unwrap().as_slice(), &[0x5A]);
        assert_eq!(translate(0x54, true, false).unwrap().as_slice(), &[0xE0, 0x4A]);
    }

    #[test]
    fn modifiers() {
        assert_eq!(translate(0xE1, true, false).unwrap().as_slice(), &[0x12]);
        assert_eq!(translate(0xE5, true, false).unwrap().as_slice(), &[0x59]);
        assert_eq!(translate(0xE4, true, false).unwrap().as_slice(), &[0xE0, 0x14]);
        assert_eq!(
            translate(0xE7, false, false).unwrap().as_slice(),
            &[0xE0, 0xF0, 0x27]
        );
    }

    #[test]
    fn print_screen_and_pause() {
        assert_eq!(
            translate(USAGE_PRINT_SCREEN, true, false).unwrap().as_slice(),
            &[0xE0, 0x12, 0xE0, 0x7C]
        );
        assert_eq!(
            translate(USAGE_PRINT_SCREEN, false, false).unwrap().as_slice(),
            &[0xE0, 0xF0, 0x7C, 0xE0, 0xF0, 0x12]
        );
        assert_eq!(
            translate(USAGE_PAUSE, true, false).unwrap().as_slice(),
            &[0xE1, 0x14, 0x77, 0xE1, 0xF0, 0x14, 0xF0, 0x77]
        );
        assert!(translate(USAGE_PAUSE, false, false).unwrap().is_empty());
        assert_eq!(
            translate(USAGE_PAUSE, true, true).unwrap().as_slice(),
            CTRL_BREAK_MAKE
        );
    }

    #[test]
    fn unmapped_usages() {
        assert_eq!(translate(0x00, true, false), None);
        assert_eq!(translate(0x02, true, false), None);
        assert_eq!(translate(0x74, true, false), None);
        assert_eq!(translate(0xA0, true, false), None);
    }
}
