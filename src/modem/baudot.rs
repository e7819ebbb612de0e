//! Baudot / ITA2 five-bit code tables
//!
//! RTTY sends 5-bit codes in two banks, letters and figures, switched by
//! dedicated shift codes. The tables here are the US-TTY variant of ITA2,
//! which is what the overwhelming majority of on-air RTTY traffic uses.

/// Letters-shift select code
pub const LTRS: u8 = 0x1F;
/// Figures-shift select code
pub const FIGS: u8 = 0x1B;

/// Letters bank, indexed by 5-bit code value
const LETTERS: [char; 32] = [
    '\0', 'E', '\n', 'A', ' ', 'S', 'I', 'U', '\r', 'D', 'R', 'J', 'N', 'F', 'C', 'K', 'T', 'Z',
    'L', 'W', 'H', 'Y', 'P', 'Q', 'O', 'B', 'G', '\0', 'M', 'X', 'V', '\0',
];

/// Figures bank, indexed by 5-bit code value
const FIGURES: [char; 32] = [
    '\0', '3', '\n', '-', ' ', '\u{7}', '8', '7', '\r', '$', '4', '\'', ',', '!', ':', '(', '5',
    '"', ')', '2', '#', '6', '0', '1', '9', '?', '&', '\0', '.', '/', ';', '\0',
];

/// Current shift bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Letters,
    Figures,
}

/// Stateful Baudot decoder: tracks the shift bank across characters
pub struct BaudotDecoder {
    shift: Shift,
}

impl BaudotDecoder {
    pub fn new() -> Self {
        Self {
            shift: Shift::Letters,
        }
    }

    /// Decode one received 5-bit code.
    ///
    /// Shift codes update the bank and produce no character; NUL and the
    /// unused slots also produce nothing.
    pub fn decode(&mut self, code: u8) -> Option<char> {
        let code = code & 0x1F;
        match code {
            LTRS => {
                self.shift = Shift::Letters;
                None
            }
            FIGS => {
                self.shift = Shift::Figures;
                None
            }
            _ => {
                let ch = match self.shift {
                    Shift::Letters => LETTERS[code as usize],
                    Shift::Figures => FIGURES[code as usize],
                };
                if ch == '\0' {
                    None
                } else {
                    Some(ch)
                }
            }
        }
    }

    pub fn shift(&self) -> Shift {
        self.shift
    }

    /// Back to letters shift, the conventional idle state
    pub fn reset(&mut self) {
        self.shift = Shift::Letters;
    }
}

impl Default for BaudotDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one character as a (code, bank) pair, if it exists in either bank
pub fn encode_char(ch: char) -> Option<(u8, Shift)> {
    let upper = ch.to_ascii_uppercase();
    if let Some(code) = LETTERS.iter().position(|&c| c == upper && c != '\0') {
        return Some((code as u8, Shift::Letters));
    }
    if let Some(code) = FIGURES.iter().position(|&c| c == upper && c != '\0') {
        return Some((code as u8, Shift::Figures));
    }
    None
}

/// Encode a string as 5-bit codes with shift codes inserted where the bank
/// changes. Starts from letters shift, matching a decoder in its idle state.
pub fn encode_str(text: &str) -> Vec<u8> {
    let mut codes = Vec::new();
    let mut shift = Shift::Letters;

    for ch in text.chars() {
        let Some((code, bank)) = encode_char(ch) else {
            continue;
        };
        // CR/LF/space exist in both banks; keep the current shift for them
        let both_banks = matches!(ch, ' ' | '\r' | '\n');
        if !both_banks && bank != shift {
            codes.push(if bank == Shift::Figures { FIGS } else { LTRS });
            shift = bank;
        }
        codes.push(code);
    }

    codes
}
