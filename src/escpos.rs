//! ESC/POS binary command builder for thermal receipt printers.
//!
//! Produces raw byte sequences the printer device ships over whatever
//! transport is configured (bluetooth/serial/network). Text-mode only:
//! formatting, alignment, the receipt item table, paper cutting, and the
//! cash-drawer kick pulse.

// ESC/POS command bytes
const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// Width of the quantity column in an item row ("x99 ").
const QTY_COL: usize = 4;

/// Width of the amount column in an item row (right-aligned money).
const AMOUNT_COL: usize = 10;

/// Paper width in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperWidth {
    Mm58,
    Mm80,
}

impl PaperWidth {
    pub fn chars(self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }

    pub fn from_mm(mm: i32) -> Self {
        if mm <= 58 {
            PaperWidth::Mm58
        } else {
            PaperWidth::Mm80
        }
    }
}

/// Builder for generating ESC/POS binary command buffers.
///
/// ```rust,ignore
/// let data = {
///     let mut b = EscPosBuilder::new().with_paper(PaperWidth::Mm58);
///     b.init()
///         .center()
///         .bold(true).text("TILLPOINT\n").bold(false)
///         .left()
///         .item_row("Americano", 2, "7.00")
///         .separator()
///         .line_pair("TOTAL", "7.00")
///         .feed(4)
///         .cut();
///     b.build()
/// };
/// ```
pub struct EscPosBuilder {
    buffer: Vec<u8>,
    paper: PaperWidth,
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            paper: PaperWidth::Mm80,
        }
    }

    pub fn with_paper(mut self, paper: PaperWidth) -> Self {
        self.paper = paper;
        self
    }

    pub fn paper(&self) -> PaperWidth {
        self.paper
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// ESC @ — Initialize printer, reset to defaults.
    pub fn init(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x40]);
        self
    }

    // -----------------------------------------------------------------------
    // Text formatting
    // -----------------------------------------------------------------------

    /// ESC E n — Bold on/off.
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buffer
            .extend_from_slice(&[ESC, 0x45, if on { 1 } else { 0 }]);
        self
    }

    /// GS ! n — Set text size (width × height multiplier, 1–8 each).
    pub fn text_size(&mut self, width: u8, height: u8) -> &mut Self {
        let w = width.clamp(1, 8) - 1;
        let h = height.clamp(1, 8) - 1;
        self.buffer.extend_from_slice(&[GS, 0x21, (w << 4) | h]);
        self
    }

    /// Reset text size to 1×1.
    pub fn normal_size(&mut self) -> &mut Self {
        self.text_size(1, 1)
    }

    /// Double-height text (1×2) — used for the grand total.
    pub fn double_height(&mut self) -> &mut Self {
        self.text_size(1, 2)
    }

    // -----------------------------------------------------------------------
    // Alignment
    // -----------------------------------------------------------------------

    /// ESC a 0 — Left-align.
    pub fn left(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 0]);
        self
    }

    /// ESC a 1 — Centre-align.
    pub fn center(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 1]);
        self
    }

    /// ESC a 2 — Right-align.
    pub fn right(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 2]);
        self
    }

    // -----------------------------------------------------------------------
    // Text output
    // -----------------------------------------------------------------------

    /// Append text. Bytes < 0x80 pass through; anything else becomes '?'
    /// (receipt printers default to a single-byte code page).
    pub fn text(&mut self, s: &str) -> &mut Self {
        for ch in s.chars() {
            let code = ch as u32;
            if code < 0x80 {
                self.buffer.push(code as u8);
            } else {
                self.buffer.push(b'?');
            }
        }
        self
    }

    /// Append raw bytes.
    pub fn raw(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// Append a line-feed.
    pub fn lf(&mut self) -> &mut Self {
        self.buffer.push(LF);
        self
    }

    /// Print a horizontal separator using dashes, matching paper width.
    pub fn separator(&mut self) -> &mut Self {
        let width = self.paper.chars();
        for _ in 0..width {
            self.buffer.push(b'-');
        }
        self.buffer.push(LF);
        self
    }

    /// Print a line with left-aligned label and right-aligned value.
    pub fn line_pair(&mut self, label: &str, value: &str) -> &mut Self {
        let width = self.paper.chars();
        let gap = width.saturating_sub(label.len() + value.len());
        self.text(label);
        for _ in 0..gap {
            self.buffer.push(b' ');
        }
        self.text(value);
        self.lf()
    }

    /// Print a receipt item row: name column, "xN" quantity column, and a
    /// right-aligned amount column. Names longer than the name column are
    /// truncated rather than wrapped.
    pub fn item_row(&mut self, name: &str, quantity: i64, amount: &str) -> &mut Self {
        let width = self.paper.chars();
        let name_col = width.saturating_sub(QTY_COL + AMOUNT_COL);

        let shown: String = name.chars().take(name_col).collect();
        let shown_len = shown.chars().count();
        self.text(&shown);
        for _ in shown_len..name_col {
            self.buffer.push(b' ');
        }

        let qty = format!("x{quantity}");
        self.text(&qty);
        for _ in qty.len()..QTY_COL {
            self.buffer.push(b' ');
        }

        let pad = AMOUNT_COL.saturating_sub(amount.len());
        for _ in 0..pad {
            self.buffer.push(b' ');
        }
        self.text(amount);
        self.lf()
    }

    // -----------------------------------------------------------------------
    // Feed / cut
    // -----------------------------------------------------------------------

    /// ESC d n — Feed n lines.
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    /// GS V A 16 — Partial cut with 16-dot feed.
    pub fn cut(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x56, 0x41, 0x10]);
        self
    }

    // -----------------------------------------------------------------------
    // Cash drawer
    // -----------------------------------------------------------------------

    /// ESC p m t1 t2 — Kick cash drawer on pin 2.
    ///
    /// `pulse_width` is the on-time in 2 ms units; off-time is fixed at
    /// 500 ms. 25 (= 50 ms) suits most drawers.
    pub fn drawer_pulse(&mut self, pulse_width: u8) -> &mut Self {
        self.buffer
            .extend_from_slice(&[ESC, 0x70, 0x00, pulse_width, 0xFA]);
        self
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// Consume the builder and return the binary ESC/POS payload.
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Standalone drawer-kick pulse, for drawers driven without a full receipt.
pub fn drawer_kick_bytes(pulse_width: u8) -> Vec<u8> {
    let mut b = EscPosBuilder::new();
    b.drawer_pulse(pulse_width);
    b.build()
}

// ===========================================================================
// Tests
// ===========================================================================
