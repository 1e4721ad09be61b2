use std::fmt::{self, Write};

use crate::encoding::{CellMask, PunchEncoding};

/// One physical column of a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub holes: CellMask,
    /// Characters printed above the column, in the order they were struck.
    pub text: Vec<u8>,
    /// Charset active when the column was last punched.
    pub charset: &'static str,
    /// Card stock the column belongs to.
    pub card_image: &'static str,
}

impl Column {
    fn blank(charset: &'static str, card_image: &'static str) -> Self {
        Self {
            holes: CellMask::BLANK,
            text: Vec::new(),
            charset,
            card_image,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.holes.is_blank() && self.text.is_empty()
    }

    /// The character shown for this column in a one-line interpretation.
    pub fn interpreted(&self) -> char {
        self.text.first().map(|&b| b as char).unwrap_or(' ')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub seq: u32,
    columns: Vec<Column>,
}

impl Card {
    pub fn new(seq: u32, columns: usize, charset: &'static str, card_image: &'static str) -> Self {
        Self {
            seq,
            columns: vec![Column::blank(charset, card_image); columns],
        }
    }

    /// A card with the given columns, as read back from storage.
    pub fn from_columns(seq: u32, columns: Vec<Column>) -> Self {
        Self { seq, columns }
    }

    /// Wipe every column, keeping the width and sequence number.
    pub fn reset(&mut self, charset: &'static str, card_image: &'static str) {
        for col in &mut self.columns {
            *col = Column::blank(charset, card_image);
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, cn: usize) -> Option<&Column> {
        self.columns.get(cn)
    }

    pub fn is_blank(&self) -> bool {
        self.columns.iter().all(Column::is_blank)
    }

    /// Punch `byte` into column `cn`.
    ///
    /// Returns `false` when the charset cannot punch the byte (even after
    /// folding lowercase to uppercase) or the column does not exist; the card
    /// is left untouched in that case. A space is accepted and changes
    /// nothing. With `print` off the holes are cut but nothing is printed.
    pub fn punch(
        &mut self,
        cn: usize,
        byte: u8,
        enc: &dyn PunchEncoding,
        print: bool,
        overstrike_limit: usize,
    ) -> bool {
        let Some((byte, mask)) = enc.resolve(byte) else {
            return false;
        };
        let Some(col) = self.columns.get_mut(cn) else {
            return false;
        };
        if mask.is_blank() {
            return true;
        }

        col.holes |= mask;
        col.charset = enc.name();

        if col.text.contains(&byte) {
            return true;
        }
        if print && col.text.len() < overstrike_limit {
            col.text.push(byte);
        }
        true
    }

    /// Punch the zero-padded sequence number into `width` columns from `start`.
    /// Returns the columns touched.
    pub fn autonumber(
        &mut self,
        start: usize,
        width: usize,
        enc: &dyn PunchEncoding,
        print: bool,
        overstrike_limit: usize,
    ) -> std::ops::Range<usize> {
        let digits = format!("{:0width$}", self.seq, width = width);
        // Wider numbers keep their low-order digits.
        let digits = &digits.as_bytes()[digits.len() - width..];
        for (offset, &b) in digits.iter().enumerate() {
            self.punch(start + offset, b, enc, print, overstrike_limit);
        }
        start..start + width
    }

    /// One character per column, blanks where nothing was printed.
    pub fn text(&self) -> String {
        self.columns.iter().map(Column::interpreted).collect()
    }

    pub fn render(&self, style: RenderStyle) -> String {
        match style {
            RenderStyle::AsciiX => self.render_ascii('X', ' '),
            RenderStyle::Ascii01 => self.render_ascii('1', '0'),
        }
    }

    fn render_ascii(&self, mark: char, blank: char) -> String {
        let cols = self.width();
        let mut out = String::new();
        let mut ruler = String::with_capacity(cols);
        for col in 1..=cols {
            if col % 10 == 0 {
                let digit = ((col / 10) % 10) as u8;
                ruler.push(char::from(b'0' + digit));
            } else {
                ruler.push('.');
            }
        }

        let separator = "-".repeat(cols);
        let charset = self.columns.first().map(|c| c.charset).unwrap_or("?");
        writeln!(&mut out, "Card {:08} ({} cols) [{}]", self.seq, cols, charset).ok();
        writeln!(&mut out, "     {}", ruler).ok();
        writeln!(&mut out, "     {}", self.text()).ok();
        writeln!(&mut out, "     {}", separator).ok();

        // Row labels: 12/11/0..9
        let labels = [
            "12", "11", " 0", " 1", " 2", " 3", " 4", " 5", " 6", " 7", " 8", " 9",
        ];
        for (r, label) in labels.iter().enumerate() {
            write!(&mut out, "{:>3} |", label).ok();
            let bit = match r {
                0 => 11,    // row 12
                1 => 10,    // row 11
                _ => r - 2, // rows 0..9
            };
            for col in &self.columns {
                out.push(if col.holes.has_bit(bit) { mark } else { blank });
            }
            writeln!(&mut out, "|").ok();
        }
        writeln!(&mut out, "     {}", separator).ok();
        out
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum RenderStyle {
    /// Use 'X' to mark punched holes
    #[default]
    AsciiX,
    /// Use '1'/'0' to mark punched/unpunched
    Ascii01,
}

impl fmt::Display for RenderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStyle::AsciiX => write!(f, "ascii-x"),
            RenderStyle::Ascii01 => write!(f, "ascii-01"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Charset;
    use pretty_assertions::assert_eq;

    fn blank_card() -> Card {
        Card::new(100, 80, "029", "5081")
    }

    #[test]
    fn punching_twice_changes_nothing() {
        let cs = Charset::ibm029();
        let mut card = blank_card();
        assert!(card.punch(3, b'Q', &cs, true, 4));
        let once = card.clone();
        assert!(card.punch(3, b'Q', &cs, true, 4));
        assert_eq!(card, once);
        assert_eq!(card.column(3).unwrap().text, vec![b'Q']);
    }

    #[test]
    fn overstrike_is_bounded() {
        let cs = Charset::ibm029();
        let mut card = blank_card();
        for b in [b'1', b'2', b'3', b'4', b'5'] {
            assert!(card.punch(0, b, &cs, true, 4));
        }
        let col = card.column(0).unwrap();
        assert_eq!(col.text, b"1234".to_vec());
        // Holes keep accumulating past the print limit.
        assert!(col.holes.has_bit(5));
    }

    #[test]
    fn untranslatable_and_space_leave_column_blank() {
        let cs = Charset::ibm029();
        let mut card = blank_card();
        assert!(!card.punch(0, b'~', &cs, true, 4));
        assert!(card.punch(1, b' ', &cs, true, 4));
        assert!(card.is_blank());
    }

    #[test]
    fn print_switch_off_cuts_holes_only() {
        let cs = Charset::ibm029();
        let mut card = blank_card();
        assert!(card.punch(0, b'a', &cs, false, 4));
        let col = card.column(0).unwrap();
        assert_eq!(Some(col.holes), cs.translate(b'A'));
        assert!(col.text.is_empty());
    }

    #[test]
    fn autonumber_fills_the_identification_field() {
        let cs = Charset::ibm029();
        let mut card = blank_card();
        let span = card.autonumber(72, 8, &cs, true, 4);
        assert_eq!(span, 72..80);
        assert_eq!(&card.text()[72..], "00000100");
    }

    #[test]
    fn render_marks_rows() {
        let cs = Charset::ibm029();
        let mut card = blank_card();
        card.punch(0, b'A', &cs, true, 4);
        let art = card.render(RenderStyle::AsciiX);
        let lines: Vec<&str> = art.lines().collect();
        assert!(lines[0].starts_with("Card 00000100"));
        assert!(lines[2].starts_with("     A"));
        assert!(lines[4].starts_with(" 12 |X"));
        assert!(lines[7].starts_with("  1 |X"));
        assert!(lines[8].starts_with("  2 | "));
    }
}
