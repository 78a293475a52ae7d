//! Card session state and register parsing
//!
//! The CID, CSD, SCR and OCR views the card hands back during
//! identification. The host controller strips the CRC byte from 136-bit
//! responses, so every CSD/CID bit position here is the SD-spec position
//! minus 8, split across the four little-endian response words (word 0 holds
//! bits 39:8 of the original register, word 3 the top bits).

use super::regs::CardStatus;

/// Classification established during card identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardType {
    #[default]
    Unknown,
    /// Legacy MMC device (not identified by this driver, reserved)
    Mmc,
    /// SD version 1.x
    Sd1,
    /// SD version 2.x, standard capacity (byte addressed)
    Sd2Sc,
    /// SD version 2.x, high capacity (block addressed)
    Sd2Hc,
}

impl CardType {
    /// True once identification has classified the card.
    pub fn is_known(self) -> bool {
        !matches!(self, CardType::Unknown)
    }

    pub fn name(self) -> &'static str {
        match self {
            CardType::Unknown => "unknown",
            CardType::Mmc => "MMC",
            CardType::Sd1 => "SD v1",
            CardType::Sd2Sc => "SD v2 (SC)",
            CardType::Sd2Hc => "SD v2 (HC/XC)",
        }
    }
}

/// Operating Conditions Register view.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ocr(pub u32);

impl Ocr {
    /// Card has finished its power-up sequence (busy bit released).
    pub fn powered_up(self) -> bool {
        self.0 & (1 << 31) != 0
    }

    /// Card Capacity Status: set for SDHC/SDXC.
    pub fn card_capacity(self) -> bool {
        self.0 & (1 << 30) != 0
    }

    /// Voltage window covers the 3.2-3.4 V band the Pi supplies.
    pub fn supports_3v3(self) -> bool {
        // 3.2-3.3 V is bit 20, 3.3-3.4 V is bit 21.
        self.0 & (0b11 << 20) != 0
    }
}

/// Card Identification register, decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cid {
    pub raw: [u32; 4],
    pub manufacturer: u8,
    pub oem: u16,
    pub product_name: [u8; 5],
    pub revision: u8,
    pub serial: u32,
    /// Manufacture date: year
    pub year: u16,
    /// Manufacture date: month (1-12)
    pub month: u8,
}

impl Cid {
    /// Decode the four response words of ALL_SEND_CID / SEND_CID.
    pub fn parse(resp: &[u32; 4]) -> Self {
        let product_name = [
            (resp[2] >> 24) as u8,
            (resp[2] >> 16) as u8,
            (resp[2] >> 8) as u8,
            resp[2] as u8,
            (resp[1] >> 24) as u8,
        ];
        let mdt = resp[0] & 0xFFF;
        Self {
            raw: *resp,
            manufacturer: (resp[3] >> 16) as u8,
            oem: resp[3] as u16,
            product_name,
            revision: (resp[1] >> 16) as u8,
            serial: ((resp[1] & 0xFFFF) << 16) | (resp[0] >> 16),
            year: 2000 + ((mdt >> 4) & 0xFF) as u16,
            month: (mdt & 0xF) as u8,
        }
    }

    /// Product name as a printable ASCII string.
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.product_name).unwrap_or("?????")
    }
}

/// Card-Specific Data register, decoded.
///
/// Only `structure`, the block-length exponents and the capacity fields
/// steer the driver; the rest is extracted for diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Csd {
    pub structure: u8,
    pub taac: u8,
    pub nsac: u8,
    pub tran_speed: u8,
    pub ccc: u16,
    pub read_bl_len: u8,
    /// v1 device size (12 bits)
    pub c_size: u32,
    /// v1 device size multiplier (3 bits)
    pub c_size_mult: u8,
    /// v2 device size (22 bits)
    pub ver2_c_size: u32,
    pub erase_blk_en: bool,
    pub sector_size: u8,
    pub wp_grp_enable: bool,
    pub r2w_factor: u8,
    pub write_bl_len: u8,
    pub copy: bool,
    pub perm_write_protect: bool,
    pub tmp_write_protect: bool,
    pub file_format: u8,
    pub ecc: u8,
}

impl Csd {
    /// Decode the four response words of SEND_CSD.
    pub fn parse(resp: &[u32; 4]) -> Self {
        let structure = ((resp[3] >> 22) & 0x3) as u8;
        Self {
            structure,
            taac: (resp[3] >> 8) as u8,
            nsac: resp[3] as u8,
            tran_speed: (resp[2] >> 24) as u8,
            ccc: ((resp[2] >> 12) & 0xFFF) as u16,
            read_bl_len: ((resp[2] >> 8) & 0xF) as u8,
            c_size: ((resp[2] & 0x3) << 10) | ((resp[1] >> 22) & 0x3FF),
            c_size_mult: ((resp[1] >> 7) & 0x7) as u8,
            ver2_c_size: (resp[1] >> 8) & 0x3F_FFFF,
            erase_blk_en: resp[1] & (1 << 6) != 0,
            sector_size: (((resp[1] & 0x3F) << 1) | (resp[0] >> 31)) as u8,
            wp_grp_enable: resp[0] & (1 << 23) != 0,
            r2w_factor: ((resp[0] >> 18) & 0x7) as u8,
            write_bl_len: ((resp[0] >> 14) & 0xF) as u8,
            copy: resp[0] & (1 << 6) != 0,
            perm_write_protect: resp[0] & (1 << 5) != 0,
            tmp_write_protect: resp[0] & (1 << 4) != 0,
            file_format: ((resp[0] >> 2) & 0x3) as u8,
            ecc: (resp[0] & 0x3) as u8,
        }
    }

    /// Card capacity in bytes, per the v1/v2 CSD layouts.
    pub fn capacity_bytes(&self) -> u64 {
        if self.structure >= 1 {
            // v2: fixed 512 KiB allocation units.
            (self.ver2_c_size as u64 + 1) * 512 * 1024
        } else {
            // v1: (C_SIZE+1) * 2^(C_SIZE_MULT+2) * 2^READ_BL_LEN
            (self.c_size as u64 + 1)
                << (self.c_size_mult as u32 + 2 + self.read_bl_len as u32)
        }
    }
}

/// SD Configuration Register, decoded.
///
/// The SCR arrives over the data lines as two words of a big-endian 64-bit
/// register; `parse` takes them exactly as read from the FIFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scr {
    pub raw: [u32; 2],
    /// DAT bus widths supported (bit 0: 1-bit, bit 2: 4-bit)
    pub bus_widths: u8,
    /// SD physical spec major version (0 if unrecognized)
    pub spec_version: u8,
    /// Card supports SET_BLOCKCNT (CMD23)
    pub set_blkcnt_support: bool,
}

impl Scr {
    pub fn parse(raw: [u32; 2]) -> Self {
        let hi = raw[0].swap_bytes(); // SCR bits 63:32
        let lo = raw[1].swap_bytes(); // SCR bits 31:0

        let spec = (hi >> 24) & 0xF;
        let spec3 = (hi >> 15) & 0x1;
        let spec4 = (hi >> 10) & 0x1;
        let spec_version = match (spec, spec3, spec4) {
            (0, _, _) => 1,
            (1, _, _) => 1,
            (2, 0, _) => 2,
            (2, 1, 0) => 3,
            (2, 1, 1) => 4,
            _ => 0,
        };

        Self {
            raw,
            bus_widths: ((hi >> 16) & 0xF) as u8,
            spec_version,
            // CMD_SUPPORT is SCR bits 35:32: bit 32 is CMD20, bit 33 CMD23.
            set_blkcnt_support: hi & (1 << 1) != 0,
        }
    }

    pub fn supports_4bit(&self) -> bool {
        self.bus_widths & 0x4 != 0
    }
}

/// Accumulated protocol state for the one active card.
///
/// Reset to defaults on every host reset; mutated only by the command
/// dispatcher in response to specific command completions. RCA and status
/// are meaningful only after SEND_REL_ADDR, capacity only after the CSD
/// parse.
#[derive(Debug, Default)]
pub struct CardState {
    pub card_type: CardType,
    /// Relative card address, pre-shifted into the upper 16 bits.
    pub rca: u32,
    /// Last R1 status word reported by the card.
    pub status: CardStatus,
    pub ocr: Ocr,
    pub cid: Cid,
    pub csd: Csd,
    pub scr: Scr,
}

impl CardState {
    pub fn capacity_bytes(&self) -> u64 {
        self.csd.capacity_bytes()
    }
}
