use std::collections::HashMap;
use thiserror::Error;

/// There are 12 rows in total: 12, 11, and 0..9.
/// Each column's punched holes are represented as a bitmask in a `u16`.
/// Bit meaning (LSB → MSB): bit0 = row 0, bit1 = row 1, ..., bit9 = row 9, bit10 = row 11, bit11 = row 12.
/// This layout allows easy row-by-row rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellMask(pub u16);

impl CellMask {
    pub const BLANK: CellMask = CellMask(0);
    /// Every row punched.
    pub const ALL: CellMask = CellMask(0x0fff);

    pub fn is_blank(self) -> bool {
        self.0 == 0
    }

    /// Whether the row at `bit` (see the layout above) is punched.
    pub fn has_bit(self, bit: usize) -> bool {
        (self.0 >> bit) & 1 == 1
    }
}

impl std::ops::BitOr for CellMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        CellMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for CellMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no such charset: '{0}'")]
    UnknownCharset(String),
}

/// Translates an input byte into the holes a keypunch would cut for it.
pub trait PunchEncoding {
    fn name(&self) -> &'static str;

    /// The punch pattern for `byte`, or `None` when the charset has no code for it.
    /// A blank pattern (space) is a valid translation.
    fn translate(&self, byte: u8) -> Option<CellMask>;

    /// Translate with the lowercase → uppercase fallback applied.
    ///
    /// Returns the byte that actually matched together with its pattern, so
    /// callers can print the folded character above the column.
    fn resolve(&self, byte: u8) -> Option<(u8, CellMask)> {
        if let Some(mask) = self.translate(byte) {
            return Some((byte, mask));
        }
        if byte.is_ascii_lowercase() {
            let up = byte.to_ascii_uppercase();
            return self.translate(up).map(|mask| (up, mask));
        }
        None
    }

    fn is_supported(&self, byte: u8) -> bool {
        self.resolve(byte).is_some()
    }
}

/// A named keypunch character set.
///
/// Digits and letters follow the Hollerith rules shared by every charset
/// here:
/// - Digits 0–9: punch the corresponding row (0–9)
/// - A–I: 12 + 1–9; J–R: 11 + 1–9; S–Z: 0 + 2–9
/// - Space: no punches
///
/// The special characters are what distinguish the 026 and 029 keyboards.
#[derive(Debug, Clone)]
pub struct Charset {
    name: &'static str,
    description: &'static str,
    map: HashMap<u8, CellMask>,
}

impl Charset {
    /// IBM 029 keypunch, the default.
    pub fn ibm029() -> Self {
        let mut m = hollerith_base();

        m.insert(b'&', zone12());
        m.insert(b'-', zone11());
        m.insert(b'/', row_mask(0) | row_mask(1));

        // 12-n-8
        m.insert(0xa2, zone12() | row_mask(2) | row_mask(8)); // ¢ (Latin-1)
        m.insert(b'.', zone12() | row_mask(3) | row_mask(8));
        m.insert(b'<', zone12() | row_mask(4) | row_mask(8));
        m.insert(b'(', zone12() | row_mask(5) | row_mask(8));
        m.insert(b'+', zone12() | row_mask(6) | row_mask(8));
        m.insert(b'|', zone12() | row_mask(7) | row_mask(8));
        // 11-n-8
        m.insert(b'!', zone11() | row_mask(2) | row_mask(8));
        m.insert(b'$', zone11() | row_mask(3) | row_mask(8));
        m.insert(b'*', zone11() | row_mask(4) | row_mask(8));
        m.insert(b')', zone11() | row_mask(5) | row_mask(8));
        m.insert(b';', zone11() | row_mask(6) | row_mask(8));
        m.insert(0xac, zone11() | row_mask(7) | row_mask(8)); // ¬ (Latin-1)
        // 0-n-8
        m.insert(b',', row_mask(0) | row_mask(3) | row_mask(8));
        m.insert(b'%', row_mask(0) | row_mask(4) | row_mask(8));
        m.insert(b'_', row_mask(0) | row_mask(5) | row_mask(8));
        m.insert(b'>', row_mask(0) | row_mask(6) | row_mask(8));
        m.insert(b'?', row_mask(0) | row_mask(7) | row_mask(8));
        // n-8
        m.insert(b':', row_mask(2) | row_mask(8));
        m.insert(b'#', row_mask(3) | row_mask(8));
        m.insert(b'@', row_mask(4) | row_mask(8));
        m.insert(b'\'', row_mask(5) | row_mask(8));
        m.insert(b'=', row_mask(6) | row_mask(8));
        m.insert(b'"', row_mask(7) | row_mask(8));

        Self {
            name: "029",
            description: "IBM 029 keypunch (EBCDIC card code subset)",
            map: m,
        }
    }

    /// IBM 026 with the FORTRAN (H) special characters.
    pub fn bcd_h() -> Self {
        let mut m = hollerith_base();
        m.insert(b'+', zone12());
        m.insert(b'-', zone11());
        m.insert(b'/', row_mask(0) | row_mask(1));
        m.insert(b'.', zone12() | row_mask(3) | row_mask(8));
        m.insert(b')', zone12() | row_mask(4) | row_mask(8));
        m.insert(b'$', zone11() | row_mask(3) | row_mask(8));
        m.insert(b'*', zone11() | row_mask(4) | row_mask(8));
        m.insert(b',', row_mask(0) | row_mask(3) | row_mask(8));
        m.insert(b'(', row_mask(0) | row_mask(4) | row_mask(8));
        m.insert(b'=', row_mask(3) | row_mask(8));
        m.insert(b'\'', row_mask(4) | row_mask(8));
        Self {
            name: "bcd-h",
            description: "IBM 026 FORTRAN (BCD H) keypunch",
            map: m,
        }
    }

    /// IBM 026 with the commercial (A) special characters.
    pub fn bcd_a() -> Self {
        let mut m = hollerith_base();
        m.insert(b'&', zone12());
        m.insert(b'-', zone11());
        m.insert(b'/', row_mask(0) | row_mask(1));
        m.insert(b'.', zone12() | row_mask(3) | row_mask(8));
        m.insert(b'$', zone11() | row_mask(3) | row_mask(8));
        m.insert(b'*', zone11() | row_mask(4) | row_mask(8));
        m.insert(b',', row_mask(0) | row_mask(3) | row_mask(8));
        m.insert(b'%', row_mask(0) | row_mask(4) | row_mask(8));
        m.insert(b'#', row_mask(3) | row_mask(8));
        m.insert(b'@', row_mask(4) | row_mask(8));
        Self {
            name: "bcd-a",
            description: "IBM 026 commercial (BCD A) keypunch",
            map: m,
        }
    }

    /// 029 extended with the EBCDIC lowercase card codes, so lowercase
    /// letters punch distinct holes instead of folding to uppercase.
    pub fn ebcdic() -> Self {
        let mut cs = Self::ibm029();
        // a–i: 12-0-1..9, j–r: 12-11-1..9, s–z: 11-0-2..9
        for (i, ch) in (b'a'..=b'i').enumerate() {
            cs.map.insert(ch, zone12() | row_mask(0) | row_mask(i + 1));
        }
        for (i, ch) in (b'j'..=b'r').enumerate() {
            cs.map.insert(ch, zone12() | zone11() | row_mask(i + 1));
        }
        for (i, ch) in (b's'..=b'z').enumerate() {
            cs.map.insert(ch, zone11() | row_mask(0) | row_mask(i + 2));
        }
        cs.name = "ebcdic";
        cs.description = "IBM 029 with full EBCDIC lowercase";
        cs
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Every charset known to the simulator, default first.
    pub fn all() -> Vec<Charset> {
        vec![
            Charset::ibm029(),
            Charset::bcd_h(),
            Charset::bcd_a(),
            Charset::ebcdic(),
        ]
    }

    /// Resolve a charset by name (case-insensitive), accepting the classic
    /// keypunch aliases.
    pub fn find(name: &str) -> Result<Charset, EncodeError> {
        let lname = name.to_ascii_lowercase();
        let canonical = match lname.as_str() {
            "029" | "ibm029" => "029",
            "026ftn" | "bcd-h" => "bcd-h",
            "026comm" | "bcd-a" => "bcd-a",
            other => other,
        };
        Self::all()
            .into_iter()
            .find(|cs| cs.name == canonical)
            .ok_or_else(|| EncodeError::UnknownCharset(name.to_string()))
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::ibm029()
    }
}

impl PunchEncoding for Charset {
    fn name(&self) -> &'static str {
        self.name
    }

    fn translate(&self, byte: u8) -> Option<CellMask> {
        self.map.get(&byte).copied()
    }
}

fn hollerith_base() -> HashMap<u8, CellMask> {
    let mut m = HashMap::new();

    // Space = no punches
    m.insert(b' ', CellMask::BLANK);

    // Digits 0..9 → rows 0..9
    for d in b'0'..=b'9' {
        m.insert(d, row_mask((d - b'0') as usize));
    }
    // A–I : 12 + 1..9
    for (i, ch) in (b'A'..=b'I').enumerate() {
        m.insert(ch, zone12() | row_mask(i + 1));
    }
    // J–R : 11 + 1..9
    for (i, ch) in (b'J'..=b'R').enumerate() {
        m.insert(ch, zone11() | row_mask(i + 1));
    }
    // S–Z : 0 + 2..9
    for (i, ch) in (b'S'..=b'Z').enumerate() {
        m.insert(ch, row_mask(0) | row_mask(i + 2));
    }
    m
}

/// Bit utilities: rows 0..9
fn row_mask(row: usize) -> CellMask {
    CellMask(1u16 << row)
}
fn zone11() -> CellMask {
    CellMask(1u16 << 10)
}
fn zone12() -> CellMask {
    CellMask(1u16 << 11)
}
