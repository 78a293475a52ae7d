//! EMMC Register Definitions
//!
//! Register offsets and bitfields of the BCM2835/BCM2837 EMMC (Arasan
//! SDHCI-compatible) host controller, as documented in the BCM2835 ARM
//! Peripherals manual. All layouts are expressed as shift/mask constants over
//! plain 32-bit values; no compiler bitfield layout is relied on.

use bitflags::bitflags;

// ============================================================================
// Register Offsets (from the EMMC block base)
// ============================================================================

/// ACMD23 Argument
pub const EMMC_ARG2: u32 = 0x00;

/// Block Size and Count
pub const EMMC_BLKSIZECNT: u32 = 0x04;

/// Argument
pub const EMMC_ARG1: u32 = 0x08;

/// Command and Transfer Mode
pub const EMMC_CMDTM: u32 = 0x0C;

/// Response (4 words: 0x10, 0x14, 0x18, 0x1C)
pub const EMMC_RESP0: u32 = 0x10;
pub const EMMC_RESP1: u32 = 0x14;
pub const EMMC_RESP2: u32 = 0x18;
pub const EMMC_RESP3: u32 = 0x1C;

/// Data FIFO
pub const EMMC_DATA: u32 = 0x20;

/// Status
pub const EMMC_STATUS: u32 = 0x24;

/// Host Configuration 0
pub const EMMC_CONTROL0: u32 = 0x28;

/// Host Configuration 1 (clock and reset)
pub const EMMC_CONTROL1: u32 = 0x2C;

/// Interrupt Flags
pub const EMMC_INTERRUPT: u32 = 0x30;

/// Interrupt Flag Enable
pub const EMMC_IRPT_MASK: u32 = 0x34;

/// Interrupt Generation Enable
pub const EMMC_IRPT_EN: u32 = 0x38;

/// Host Configuration 2
pub const EMMC_CONTROL2: u32 = 0x3C;

/// Force Interrupt Event
pub const EMMC_FORCE_IRPT: u32 = 0x50;

/// Timeout in boot mode
pub const EMMC_BOOT_TIMEOUT: u32 = 0x70;

/// Debug Bus Configuration
pub const EMMC_DBG_SEL: u32 = 0x74;

/// SPI Interrupt Support
pub const EMMC_SPI_INT_SPT: u32 = 0xF0;

/// Slot Interrupt Status and Version
pub const EMMC_SLOTISR_VER: u32 = 0xFC;

// ============================================================================
// CMDTM Register (0x0C) Bitfields
// ============================================================================

/// Enable the block counter for multi-block transfers
pub const TM_BLKCNT_EN: u32 = 1 << 1;

/// Auto command: send CMD12 when the block counter reaches zero
pub const TM_AUTO_CMD12: u32 = 0b01 << 2;

/// Data transfer direction (1 = card to host)
pub const TM_DAT_DIR: u32 = 1 << 4;

/// Multi-block transfer
pub const TM_MULTI_BLOCK: u32 = 1 << 5;

/// Response type field shift (2 bits)
pub const CMD_RSPNS_SHIFT: u32 = 16;

/// No response
pub const CMD_RSPNS_NONE: u32 = 0b00 << CMD_RSPNS_SHIFT;

/// 136-bit response
pub const CMD_RSPNS_136: u32 = 0b01 << CMD_RSPNS_SHIFT;

/// 48-bit response
pub const CMD_RSPNS_48: u32 = 0b10 << CMD_RSPNS_SHIFT;

/// 48-bit response using busy
pub const CMD_RSPNS_48_BUSY: u32 = 0b11 << CMD_RSPNS_SHIFT;

/// Check response CRC
pub const CMD_CRCCHK_EN: u32 = 1 << 19;

/// Check response command index
pub const CMD_IXCHK_EN: u32 = 1 << 20;

/// Command involves a data transfer
pub const CMD_ISDATA: u32 = 1 << 21;

/// Command index field shift (6 bits)
pub const CMD_INDEX_SHIFT: u32 = 24;

/// Extract the 6-bit hardware command index from a CMDTM value.
#[inline]
pub const fn cmdtm_index(cmdtm: u32) -> u8 {
    ((cmdtm >> CMD_INDEX_SHIFT) & 0x3F) as u8
}

// ============================================================================
// STATUS Register (0x24) Bitfields
// ============================================================================

/// Command line in use
pub const SR_CMD_INHIBIT: u32 = 1 << 0;

/// Data lines in use
pub const SR_DAT_INHIBIT: u32 = 1 << 1;

/// At least one data line is active
pub const SR_DAT_ACTIVE: u32 = 1 << 2;

/// Data can be written to the FIFO
pub const SR_WRITE_AVAILABLE: u32 = 1 << 10;

/// Data is available to read from the FIFO
pub const SR_READ_AVAILABLE: u32 = 1 << 11;

// ============================================================================
// CONTROL0 Register (0x28) Bitfields
// ============================================================================

/// Use 4 data lines
pub const C0_HCTL_DWIDTH: u32 = 1 << 1;

/// Select high-speed timing
pub const C0_HCTL_HS_EN: u32 = 1 << 2;

/// Use 8 data lines
pub const C0_HCTL_8BIT: u32 = 1 << 5;

// ============================================================================
// CONTROL1 Register (0x2C) Bitfields
// ============================================================================

/// Enable the internal EMMC clock
pub const C1_CLK_INTLEN: u32 = 1 << 0;

/// Internal clock is stable
pub const C1_CLK_STABLE: u32 = 1 << 1;

/// Enable the SD clock
pub const C1_CLK_EN: u32 = 1 << 2;

/// Clock generation mode (0 = divided, 1 = programmable)
pub const C1_CLK_GENSEL: u32 = 1 << 5;

/// Upper two bits of the 10-bit clock divisor (bits 7:6)
pub const C1_CLK_FREQ_MS2_SHIFT: u32 = 6;

/// Lower eight bits of the 10-bit clock divisor (bits 15:8)
pub const C1_CLK_FREQ8_SHIFT: u32 = 8;

/// Mask covering both divisor fields
pub const C1_CLK_FREQ_MASK: u32 = (0xFF << C1_CLK_FREQ8_SHIFT) | (0b11 << C1_CLK_FREQ_MS2_SHIFT);

/// Data timeout unit exponent field (bits 19:16)
pub const C1_DATA_TOUNIT_SHIFT: u32 = 16;

/// Maximum data timeout exponent (TMCLK * 2^27)
pub const C1_DATA_TOUNIT_MAX: u32 = 0xE << C1_DATA_TOUNIT_SHIFT;

/// Reset the complete host circuit
pub const C1_SRST_HC: u32 = 1 << 24;

/// Reset the command handling circuit
pub const C1_SRST_CMD: u32 = 1 << 25;

/// Reset the data handling circuit
pub const C1_SRST_DATA: u32 = 1 << 26;

/// Encode a 10-bit clock divisor into its CONTROL1 fields.
#[inline]
pub const fn encode_divisor(divisor: u32) -> u32 {
    ((divisor & 0xFF) << C1_CLK_FREQ8_SHIFT) | (((divisor >> 8) & 0b11) << C1_CLK_FREQ_MS2_SHIFT)
}

/// Recover the 10-bit clock divisor from a CONTROL1 value.
#[inline]
pub const fn decode_divisor(control1: u32) -> u32 {
    ((control1 >> C1_CLK_FREQ8_SHIFT) & 0xFF) | (((control1 >> C1_CLK_FREQ_MS2_SHIFT) & 0b11) << 8)
}

// ============================================================================
// SLOTISR_VER Register (0xFC) Bitfields
// ============================================================================

/// Host controller spec version field shift (bits 23:16)
pub const SLOTISR_SDVERSION_SHIFT: u32 = 16;

/// Vendor version field shift (bits 31:24)
pub const SLOTISR_VENDOR_SHIFT: u32 = 24;

/// Host Controller Spec Version 1.00
pub const HOST_SPEC_V1: u32 = 0;

/// Host Controller Spec Version 2.00
pub const HOST_SPEC_V2: u32 = 1;

/// Host Controller Spec Version 3.00 (10-bit programmable divider)
pub const HOST_SPEC_V3: u32 = 2;

/// Extract the host controller spec version code from SLOTISR_VER.
#[inline]
pub const fn host_spec_version(slotisr_ver: u32) -> u32 {
    (slotisr_ver >> SLOTISR_SDVERSION_SHIFT) & 0xFF
}

bitflags! {
    /// INTERRUPT register (0x30) flags. Write-1-to-clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupt: u32 {
        /// Command has finished
        const CMD_DONE = 1 << 0;
        /// Data transfer has finished
        const DATA_DONE = 1 << 1;
        /// Data transfer stopped at block gap
        const BLOCK_GAP = 1 << 2;
        /// DATA register can be written
        const WRITE_RDY = 1 << 4;
        /// DATA register contains data to read
        const READ_RDY = 1 << 5;
        /// Card made an interrupt request
        const CARD = 1 << 8;
        /// Clock retune request
        const RETUNE = 1 << 12;
        /// Boot acknowledge received
        const BOOTACK = 1 << 13;
        /// Boot operation terminated
        const ENDBOOT = 1 << 14;
        /// An error occurred (summary bit)
        const ERR = 1 << 15;
        /// Command response timeout
        const CTO_ERR = 1 << 16;
        /// Command response CRC error
        const CCRC_ERR = 1 << 17;
        /// Command response end bit error
        const CEND_ERR = 1 << 18;
        /// Incorrect command index in response
        const CBAD_ERR = 1 << 19;
        /// Data timeout
        const DTO_ERR = 1 << 20;
        /// Data CRC error
        const DCRC_ERR = 1 << 21;
        /// Data end bit error
        const DEND_ERR = 1 << 22;
        /// Auto command error
        const ACMD_ERR = 1 << 24;

        /// All error-category flags.
        const ERROR_MASK = Self::ERR.bits()
            | Self::CTO_ERR.bits()
            | Self::CCRC_ERR.bits()
            | Self::CEND_ERR.bits()
            | Self::CBAD_ERR.bits()
            | Self::DTO_ERR.bits()
            | Self::DCRC_ERR.bits()
            | Self::DEND_ERR.bits()
            | Self::ACMD_ERR.bits();

        /// Timeout-category error flags.
        const TIMEOUT_MASK = Self::CTO_ERR.bits() | Self::DTO_ERR.bits();
    }
}

bitflags! {
    /// Card status word (R1 response) as defined by the SD Physical Layer
    /// specification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CardStatus: u32 {
        /// Argument was out of the card's address range
        const OUT_OF_RANGE = 1 << 31;
        /// Misaligned address
        const ADDRESS_ERROR = 1 << 30;
        /// Block length not allowed or transfer length mismatch
        const BLOCK_LEN_ERROR = 1 << 29;
        /// Error in the sequence of erase commands
        const ERASE_SEQ_ERROR = 1 << 28;
        /// Invalid selection of blocks for erase
        const ERASE_PARAM = 1 << 27;
        /// Attempted write to a protected block
        const WP_VIOLATION = 1 << 26;
        /// Card is locked by the host
        const CARD_IS_LOCKED = 1 << 25;
        /// Sequence or password error in lock/unlock
        const LOCK_UNLOCK_FAILED = 1 << 24;
        /// CRC check of a previous command failed
        const COM_CRC_ERROR = 1 << 23;
        /// Command not legal for the card state
        const ILLEGAL_COMMAND = 1 << 22;
        /// Internal ECC failed to correct the data
        const CARD_ECC_FAILED = 1 << 21;
        /// Internal card controller error
        const CC_ERROR = 1 << 20;
        /// General or unknown error
        const ERROR = 1 << 19;
        /// CSD overwrite error
        const CSD_OVERWRITE = 1 << 16;
        /// Only partial address space was erased
        const WP_ERASE_SKIP = 1 << 15;
        /// Command executed without internal ECC
        const CARD_ECC_DISABLED = 1 << 14;
        /// Buffer empty signalling on the bus
        const READY_FOR_DATA = 1 << 8;
        /// Card expects an application-specific command next
        const APP_CMD = 1 << 5;
        /// Authentication sequence error
        const AKE_SEQ_ERROR = 1 << 2;

        /// The documented R1 error bits (0xFFF9_C004).
        const ERRORS = Self::OUT_OF_RANGE.bits()
            | Self::ADDRESS_ERROR.bits()
            | Self::BLOCK_LEN_ERROR.bits()
            | Self::ERASE_SEQ_ERROR.bits()
            | Self::ERASE_PARAM.bits()
            | Self::WP_VIOLATION.bits()
            | Self::CARD_IS_LOCKED.bits()
            | Self::LOCK_UNLOCK_FAILED.bits()
            | Self::COM_CRC_ERROR.bits()
            | Self::ILLEGAL_COMMAND.bits()
            | Self::CARD_ECC_FAILED.bits()
            | Self::CC_ERROR.bits()
            | Self::ERROR.bits()
            | Self::CSD_OVERWRITE.bits()
            | Self::WP_ERASE_SKIP.bits()
            | Self::CARD_ECC_DISABLED.bits()
            | Self::AKE_SEQ_ERROR.bits();
    }
}

/// Current state field (bits 12:9) of an R1 card status word.
#[inline]
pub const fn card_state(status: u32) -> u32 {
    (status >> 9) & 0xF
}
