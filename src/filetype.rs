/// File type translation between DOS 3.3 and ProDOS
///
/// DOS 3.3 has eight coarse type codes; ProDOS has a one-byte type plus a
/// 16-bit auxiliary type. Codes outside the table pass through unchanged, so
/// a ProDOS-typed file that ended up on a DOS 3.3 disk keeps its byte.

/// ProDOS type: typeless
pub const PRODOS_NON: u8 = 0x00;
/// ProDOS type: text
pub const PRODOS_TXT: u8 = 0x04;
/// ProDOS type: binary
pub const PRODOS_BIN: u8 = 0x06;
/// ProDOS type: Apple /// font
pub const PRODOS_FOT: u8 = 0x08;
/// ProDOS type: directory
pub const PRODOS_DIR: u8 = 0x0F;
/// ProDOS type: source code
pub const PRODOS_SRC: u8 = 0xB0;
/// ProDOS type: packed super hi-res picture
pub const PRODOS_PNT: u8 = 0xC0;
/// ProDOS type: super hi-res picture
pub const PRODOS_PIC: u8 = 0xC1;
/// ProDOS type: Integer BASIC program
pub const PRODOS_INT: u8 = 0xFA;
/// ProDOS type: Applesoft BASIC program
pub const PRODOS_BAS: u8 = 0xFC;
/// ProDOS type: relocatable object
pub const PRODOS_REL: u8 = 0xFE;
/// ProDOS type: system program
pub const PRODOS_SYS: u8 = 0xFF;

/// Load address recorded for Applesoft programs
pub const APPLESOFT_AUX_TYPE: u16 = 0x0801;

/// DOS 3.3 file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dos33FileType {
    /// Text (T, 0x00)
    Text,
    /// Integer BASIC (I, 0x01)
    IntegerBasic,
    /// Applesoft BASIC (A, 0x02)
    Applesoft,
    /// Binary (B, 0x04)
    Binary,
    /// S-type (0x08)
    SType,
    /// Relocatable (R, 0x10)
    Relocatable,
    /// New A-type (0x20)
    NewA,
    /// New B-type (0x40)
    NewB,
    /// Unknown code
    Other(u8),
}

impl Dos33FileType {
    /// Parse from a catalog type byte (lock bit ignored)
    pub fn from_code(code: u8) -> Self {
        match code & 0x7F {
            0x00 => Dos33FileType::Text,
            0x01 => Dos33FileType::IntegerBasic,
            0x02 => Dos33FileType::Applesoft,
            0x04 => Dos33FileType::Binary,
            0x08 => Dos33FileType::SType,
            0x10 => Dos33FileType::Relocatable,
            0x20 => Dos33FileType::NewA,
            0x40 => Dos33FileType::NewB,
            other => Dos33FileType::Other(other),
        }
    }

    /// Catalog type byte (without lock bit)
    pub fn code(&self) -> u8 {
        match self {
            Dos33FileType::Text => 0x00,
            Dos33FileType::IntegerBasic => 0x01,
            Dos33FileType::Applesoft => 0x02,
            Dos33FileType::Binary => 0x04,
            Dos33FileType::SType => 0x08,
            Dos33FileType::Relocatable => 0x10,
            Dos33FileType::NewA => 0x20,
            Dos33FileType::NewB => 0x40,
            Dos33FileType::Other(code) => *code & 0x7F,
        }
    }

    /// Parse a catalog letter ("T", "I", "A", "B", "S", "R")
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.to_ascii_uppercase().as_str() {
            "T" => Some(Dos33FileType::Text),
            "I" => Some(Dos33FileType::IntegerBasic),
            "A" => Some(Dos33FileType::Applesoft),
            "B" => Some(Dos33FileType::Binary),
            "S" => Some(Dos33FileType::SType),
            "R" => Some(Dos33FileType::Relocatable),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dos33FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dos33FileType::Text => write!(f, "T"),
            Dos33FileType::IntegerBasic => write!(f, "I"),
            Dos33FileType::Applesoft => write!(f, "A"),
            Dos33FileType::Binary => write!(f, "B"),
            Dos33FileType::SType => write!(f, "S"),
            Dos33FileType::Relocatable => write!(f, "R"),
            Dos33FileType::NewA => write!(f, "a"),
            Dos33FileType::NewB => write!(f, "b"),
            Dos33FileType::Other(code) => write!(f, "${:02X}", code),
        }
    }
}

/// Convert a DOS 3.3 type byte to a ProDOS (type, aux type) pair
pub fn dos33_to_prodos(code: u8) -> (u8, u16) {
    match Dos33FileType::from_code(code) {
        Dos33FileType::Text => (PRODOS_TXT, 0),
        Dos33FileType::IntegerBasic => (PRODOS_INT, 0),
        Dos33FileType::Applesoft => (PRODOS_BAS, APPLESOFT_AUX_TYPE),
        Dos33FileType::Binary => (PRODOS_BIN, 0),
        Dos33FileType::SType => (PRODOS_SRC, 0),
        Dos33FileType::Relocatable => (PRODOS_REL, 0),
        Dos33FileType::NewA | Dos33FileType::NewB => (PRODOS_NON, 0),
        Dos33FileType::Other(_) => (code, 0),
    }
}

/// Convert a ProDOS type (and aux type) to a DOS 3.3 type byte
pub fn prodos_to_dos33(file_type: u8, _aux_type: u16) -> u8 {
    match file_type {
        PRODOS_TXT => Dos33FileType::Text.code(),
        PRODOS_INT => Dos33FileType::IntegerBasic.code(),
        PRODOS_BAS => Dos33FileType::Applesoft.code(),
        PRODOS_BIN | PRODOS_FOT | PRODOS_PNT | PRODOS_PIC => Dos33FileType::Binary.code(),
        PRODOS_SRC => Dos33FileType::SType.code(),
        PRODOS_REL => Dos33FileType::Relocatable.code(),
        PRODOS_NON => Dos33FileType::NewB.code(),
        other => other,
    }
}

/// Three-letter name of a ProDOS file type
pub fn prodos_type_name(file_type: u8) -> &'static str {
    match file_type {
        0x00 => "NON",
        0x01 => "BAD",
        0x04 => "TXT",
        0x06 => "BIN",
        0x08 => "FOT",
        0x0F => "DIR",
        0x19 => "ADB",
        0x1A => "AWP",
        0x1B => "ASP",
        0xB0 => "SRC",
        0xB3 => "S16",
        0xB4 => "RTL",
        0xB5 => "EXE",
        0xB6 => "PIF",
        0xB7 => "TIF",
        0xB8 => "NDA",
        0xB9 => "CDA",
        0xBA => "TOL",
        0xBB => "DVR",
        0xBC => "LDF",
        0xBD => "FST",
        0xBF => "DOC",
        0xC0 => "PNT",
        0xC1 => "PIC",
        0xC2 => "ANI",
        0xC3 => "PAL",
        0xC8 => "FON",
        0xC9 => "FND",
        0xCA => "ICN",
        0xD5 => "MUS",
        0xD6 => "INS",
        0xD7 => "MDI",
        0xD8 => "SND",
        0xDB => "DBM",
        0xE0 => "LBR",
        0xEF => "PAS",
        0xF0 => "CMD",
        0xF1 => "OVL",
        0xFA => "INT",
        0xFC => "BAS",
        0xFD => "VAR",
        0xFE => "REL",
        0xFF => "SYS",
        _ => "???",
    }
}

/// Parse a ProDOS type given as a name ("BIN") or hex byte ("$06", "0x06", "06")
pub fn parse_prodos_type(text: &str) -> Option<u8> {
    let upper = text.trim().to_ascii_uppercase();
    if let Some(code) = (0..=0xFFu8).find(|&c| prodos_type_name(c) == upper && upper != "???") {
        return Some(code);
    }
    let hex = upper
        .strip_prefix('$')
        .or_else(|| upper.strip_prefix("0X"))
        .unwrap_or(&upper);
    u8::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_round_trip() {
        assert_eq!(dos33_to_prodos(0x04), (0x06, 0));
        assert_eq!(prodos_to_dos33(0x06, 0), 0x04);
    }

    #[test]
    fn test_table() {
        assert_eq!(dos33_to_prodos(0x00), (PRODOS_TXT, 0));
        assert_eq!(dos33_to_prodos(0x01), (PRODOS_INT, 0));
        assert_eq!(dos33_to_prodos(0x02), (PRODOS_BAS, 0x0801));
        assert_eq!(dos33_to_prodos(0x08), (PRODOS_SRC, 0));
        assert_eq!(dos33_to_prodos(0x10), (PRODOS_REL, 0));
        assert_eq!(dos33_to_prodos(0x40), (PRODOS_NON, 0));
        // Lock bit does not affect the mapping
        assert_eq!(dos33_to_prodos(0x84), (PRODOS_BIN, 0));
    }

    #[test]
    fn test_graphics_collapse_to_binary() {
        assert_eq!(prodos_to_dos33(PRODOS_FOT, 0x4000), 0x04);
        assert_eq!(prodos_to_dos33(PRODOS_PNT, 0x0001), 0x04);
        assert_eq!(prodos_to_dos33(PRODOS_PIC, 0), 0x04);
    }

    #[test]
    fn test_unknown_passes_through() {
        assert_eq!(prodos_to_dos33(0x19, 0), 0x19);
        assert_eq!(dos33_to_prodos(0x03), (0x03, 0));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(prodos_type_name(0xFC), "BAS");
        assert_eq!(Dos33FileType::from_code(0x82).to_string(), "A");
        assert_eq!(Dos33FileType::from_letter("b"), Some(Dos33FileType::Binary));
    }

    #[test]
    fn test_parse_prodos_type() {
        assert_eq!(parse_prodos_type("bin"), Some(0x06));
        assert_eq!(parse_prodos_type("$FC"), Some(0xFC));
        assert_eq!(parse_prodos_type("0x04"), Some(0x04));
        assert_eq!(parse_prodos_type("nope"), None);
    }
}
