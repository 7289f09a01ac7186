//! Detection of one complete, balanced top-level `{ ... }` object in
//! generated text.
//!
//! The scanner understands just enough JSON lexing to ignore braces inside
//! string literals: it tracks whether it is inside a string and how many
//! consecutive backslashes precede the current byte. It does not validate
//! anything else.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BraceScanner {
    depth: u32,
    seen_open: bool,
    in_string: bool,
    backslashes: u32,
}

impl BraceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns `true` once the outermost object has closed.
    pub fn push(&mut self, byte: u8) -> bool {
        if !self.seen_open && byte != b'{' {
            return false;
        }
        if byte < 0x20 {
            self.backslashes = 0;
            return false;
        }
        if byte == b'\\' {
            self.backslashes += 1;
            return false;
        }

        let escaped = self.backslashes % 2 == 1;
        self.backslashes = 0;

        if byte == b'"' && !escaped {
            self.in_string = !self.in_string;
            return false;
        }
        if self.in_string {
            return false;
        }

        match byte {
            b'{' => {
                self.depth += 1;
                self.seen_open = true;
            }
            b'}' if self.depth > 0 => {
                self.depth -= 1;
                if self.depth == 0 {
                    return true;
                }
            }
            _ => {}
        }
        false
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// Whether `text` contains a complete top-level object.
///
/// Rescans from the start on every call; the decode loop calls this on the
/// full accumulated output after each token.
pub fn closes_object(text: &[u8]) -> bool {
    let mut scanner = BraceScanner::new();
    text.iter().any(|&b| scanner.push(b))
}
