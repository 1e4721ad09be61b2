use anyhow::{Result, anyhow};

/// A preprinted card form that a card can be fed from.
///
/// The keypunch does not care what is printed on the stock; the style only
/// travels with each punched column so that a renderer or a saved deck can
/// show the card on the right form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardImage {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [CardField],
}

/// Inclusive, 1-based column span labelled on a [`CardImage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardField {
    pub start: usize,
    pub end: usize,
    pub label: &'static str,
}

/// Registry of built-in card stock.
pub struct CardImageRegistry;

impl CardImageRegistry {
    /// Return the set of available card images, default first.
    pub fn list() -> Vec<&'static CardImage> {
        vec![&IBM_5081, &FORTRAN, &COBOL, &JCL, &ASSEMBLER]
    }

    pub fn default_image() -> &'static CardImage {
        &IBM_5081
    }

    /// Resolve a card image by name (case-insensitive).
    pub fn get(name: &str) -> Result<&'static CardImage> {
        Self::list()
            .into_iter()
            .find(|img| img.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("unknown card image '{}'", name))
    }
}

macro_rules! field {
    ($start:expr, $end:expr, $label:expr) => {
        CardField {
            start: $start,
            end: $end,
            label: $label,
        }
    };
}

static FORTRAN_FIELDS: &[CardField] = &[
    field!(1, 5, "Statement number"),
    field!(6, 6, "Continuation"),
    field!(7, 72, "FORTRAN statement"),
    field!(73, 80, "Identification"),
];

static COBOL_FIELDS: &[CardField] = &[
    field!(1, 6, "Sequence number"),
    field!(7, 7, "Indicator"),
    field!(8, 11, "Area A"),
    field!(12, 72, "Area B"),
    field!(73, 80, "Identification"),
];

static JCL_FIELDS: &[CardField] = &[
    field!(1, 2, "//"),
    field!(3, 10, "Name"),
    field!(11, 15, "Operation"),
    field!(16, 71, "Operands"),
    field!(72, 72, "Continuation"),
    field!(73, 80, "Sequence number"),
];

static ASSEMBLER_FIELDS: &[CardField] = &[
    field!(1, 8, "Name"),
    field!(10, 14, "Operation"),
    field!(16, 71, "Operand / remarks"),
    field!(72, 72, "Continuation"),
    field!(73, 80, "Identification"),
];

static IBM_5081: CardImage = CardImage {
    name: "5081",
    description: "IBM 5081 general purpose card, digits printed in every column.",
    fields: &[],
};

static FORTRAN: CardImage = CardImage {
    name: "fortran",
    description: "IBM 888157 FORTRAN statement card.",
    fields: FORTRAN_FIELDS,
};

static COBOL: CardImage = CardImage {
    name: "cobol",
    description: "COBOL coding card with area A/B rulings.",
    fields: COBOL_FIELDS,
};

static JCL: CardImage = CardImage {
    name: "jcl",
    description: "OS/360 job control card.",
    fields: JCL_FIELDS,
};

static ASSEMBLER: CardImage = CardImage {
    name: "assembler",
    description: "System/360 assembler coding card.",
    fields: ASSEMBLER_FIELDS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(CardImageRegistry::get("FORTRAN").unwrap().name, "fortran");
        assert!(CardImageRegistry::get("punched-tape").is_err());
    }

    #[test]
    fn fields_are_one_based_and_ordered() {
        for img in CardImageRegistry::list() {
            let mut last = 0;
            for field in img.fields {
                assert!(field.start > last, "{} overlaps at {}", img.name, field.label);
                assert!(field.end >= field.start && field.end <= 80);
                last = field.end;
            }
        }
        let fortran = CardImageRegistry::get("fortran").unwrap();
        assert_eq!(fortran.fields.first().map(|f| (f.start, f.label)), Some((1, "Statement number")));
        assert_eq!(fortran.fields.last().map(|f| f.end), Some(80));
    }
}
