//! EMMC Host Controller Driver
//!
//! This module drives the BCM2835/BCM2837 EMMC controller through the SD
//! Physical Layer protocol: clock programming, command dispatch with
//! per-command response decoding, the card identification sequence, and
//! polled single/multi-block data transfer.
//!
//! Completion is observed by spinning on the interrupt status register;
//! every wait is bounded by a named budget below. The controller and the one
//! card session behind it are owned by a single [`EmmcController`], so
//! exclusive access is a borrow-checker property rather than a locking
//! discipline. A `spin::Mutex` global wrapper at the bottom of this module
//! serves callers (filesystem, SDIO/WiFi) that want a process-wide instance.

pub mod card;
pub mod cmd;
pub mod regs;

#[cfg(test)]
mod sim;

use self::card::{CardState, CardType};
use self::cmd::{ResponseKind, SdCmd};
use self::regs::*;
use crate::hal::{Host, MmioHost};
use crate::time::Deadline;
use spin::Mutex;

/// SD block size in bytes. Everything this driver moves is 512-byte blocks.
pub const SD_BLOCK_SIZE: usize = 512;

/// Words per block through the 32-bit data FIFO.
const WORDS_PER_BLOCK: usize = SD_BLOCK_SIZE / 4;

/// Identification-phase clock (SD spec mandates <= 400 kHz until selected).
const INIT_CLOCK_HZ: u32 = 400_000;

/// Normal operating clock.
const NORMAL_CLOCK_HZ: u32 = 25_000_000;

/// EMMC base clock on the Pi 3 when the firmware mailbox is not consulted.
pub const DEFAULT_BASE_CLOCK_HZ: u32 = 41_666_667;

/// Budget for clock/reset waits (inhibit clear, reset self-clear, stable).
const SHORT_WAIT_US: u64 = 100_000;

/// Budget for command-line idle and command-completion waits.
const CMD_WAIT_US: u64 = 1_000_000;

/// Budget for per-block ready and data-done waits.
const DATA_WAIT_US: u64 = 1_000_000;

/// Budget for draining the SCR words from the FIFO, polled at 1 us.
const FIFO_WAIT_US: u64 = 100_000;

/// Erase completion poll: iterations x step, roughly ten seconds.
const ERASE_POLL_ITERS: u32 = 1_000_000;
const ERASE_POLL_STEP_US: u32 = 10;

/// ACMD41 operating-condition poll: retries and spacing.
const ACMD41_RETRIES: u32 = 6;
const ACMD41_RETRY_DELAY_US: u32 = 400_000;

/// ACMD41 argument: voltage window plus HCS/XPC for v2 cards.
const ACMD41_ARG_HC: u32 = 0x50FF_8000;

/// ACMD41 argument for v1 cards: voltage window only.
const ACMD41_ARG_SC: u32 = 0x00FF_8000;

/// CMD8 argument: 2.7-3.6 V range plus the 0xAA check pattern.
const IF_COND_CHECK: u32 = 0x1AA;

/// EMMC driver error.
///
/// Flat taxonomy; lower-level failures propagate unchanged to the caller.
/// Nothing here is fatal: re-running [`EmmcController::init_card`] fully
/// resets the session and the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdError {
    /// Clock programming failed (quiescence or stability wait expired)
    Clock,
    /// Host circuit reset did not self-clear
    Reset,
    /// Card's voltage window excludes the supply voltage
    Voltage,
    /// Card or protocol error (error interrupt, R1 error bits, bad echo)
    Card,
    /// Command line never became idle
    Busy,
    /// A bounded wait expired without completion
    Timeout,
    /// Application-specific command was not acknowledged by the card
    AppCmd,
    /// Operation attempted before a card was identified
    NoResponse,
}

/// The EMMC host controller and its single card session.
pub struct EmmcController<H: Host> {
    host: H,
    base_clock_hz: u32,
    /// Host controller spec version code, read from SLOTISR_VER at reset.
    version: u32,
    card: CardState,
}

impl<H: Host> EmmcController<H> {
    /// Create a driver over `host`.
    ///
    /// `base_clock_hz` is the EMMC input clock, normally obtained from the
    /// firmware's get-clock-rate mailbox property;
    /// [`DEFAULT_BASE_CLOCK_HZ`] matches the stock Pi 3 firmware.
    pub fn new(host: H, base_clock_hz: u32) -> Self {
        Self {
            host,
            base_clock_hz,
            version: 0,
            card: CardState::default(),
        }
    }

    /// The identified card session (read-only).
    pub fn card(&self) -> &CardState {
        &self.card
    }

    /// Log the host controller version. Diagnostic only.
    pub fn log_controller_info(&self) {
        let ver = self.host.read_reg(EMMC_SLOTISR_VER);
        log::info!(
            "EMMC: host spec version {}, vendor version {:#x}",
            host_spec_version(ver) + 1,
            ver >> SLOTISR_VENDOR_SHIFT
        );
    }

    // ========================================================================
    // Clock Controller
    // ========================================================================

    /// Compute the 10-bit divisor for a target frequency.
    ///
    /// Starts from `ceil(base/target)` clamped to the field maximum. Hosts
    /// older than spec v3 only divide by powers of two and encode the
    /// divisor one shift short, capped at 128; v3 hosts require at least 4
    /// when the raw divisor falls under 3.
    fn clock_divisor(&self, freq_hz: u32) -> u32 {
        let mut divisor = self.base_clock_hz.div_ceil(freq_hz).min(0x3FF);
        if self.version < HOST_SPEC_V3 {
            let shift = if divisor < 2 {
                0
            } else {
                ((31 - divisor.leading_zeros()) - 1).min(7)
            };
            divisor = 1 << shift;
        } else if divisor < 3 {
            divisor = 4;
        }
        divisor
    }

    /// Program the SD clock to approximately `freq_hz`.
    ///
    /// Requires the command and data lines quiescent; waits for both, then
    /// gates the clock off, writes the divisor fields, and waits for the
    /// internal clock to report stable.
    pub fn set_clock(&mut self, freq_hz: u32) -> Result<(), SdError> {
        let deadline = Deadline::after(&self.host, SHORT_WAIT_US);
        while self.host.read_reg(EMMC_STATUS) & (SR_CMD_INHIBIT | SR_DAT_INHIBIT) != 0 {
            if deadline.expired(&self.host) {
                log::error!(
                    "EMMC: set_clock: lines still busy, status={:#010x}",
                    self.host.read_reg(EMMC_STATUS)
                );
                return Err(SdError::Clock);
            }
            self.host.delay_us(1);
        }

        let divisor = self.clock_divisor(freq_hz);

        let control1 = self.host.read_reg(EMMC_CONTROL1) & !C1_CLK_EN;
        self.host.write_reg(EMMC_CONTROL1, control1);
        self.host.delay_us(10);

        let control1 = (control1 & !C1_CLK_FREQ_MASK) | encode_divisor(divisor);
        self.host.write_reg(EMMC_CONTROL1, control1);
        self.host.delay_us(10);

        self.host.write_reg(EMMC_CONTROL1, control1 | C1_CLK_EN);

        let deadline = Deadline::after(&self.host, SHORT_WAIT_US);
        while self.host.read_reg(EMMC_CONTROL1) & C1_CLK_STABLE == 0 {
            if deadline.expired(&self.host) {
                log::error!("EMMC: set_clock: clock never stabilized");
                return Err(SdError::Clock);
            }
            self.host.delay_us(1);
        }

        log::debug!(
            "EMMC: clock set to {} Hz (base {}, divisor {})",
            freq_hz,
            self.base_clock_hz,
            divisor
        );
        Ok(())
    }

    // ========================================================================
    // Command Dispatcher
    // ========================================================================

    /// Issue a logical command and return response word 0.
    ///
    /// Application-specific commands are transparently prefixed with
    /// APP_CMD; once an RCA is known the prefix response must carry the
    /// card's APP_CMD acknowledgment or the command fails with
    /// [`SdError::AppCmd`]. Commands whose descriptor is RCA-addressed
    /// ignore `arg` and use the session RCA.
    pub fn send_command(&mut self, command: SdCmd, arg: u32) -> Result<u32, SdError> {
        if command.descriptor().app_cmd {
            if self.card.rca != 0 {
                self.issue_command(SdCmd::AppCmdRca, 0)?;
                if !self.card.status.contains(CardStatus::APP_CMD) {
                    log::debug!("EMMC: card did not acknowledge APP_CMD");
                    return Err(SdError::AppCmd);
                }
            } else {
                self.issue_command(SdCmd::AppCmd, 0)?;
            }
        }
        self.issue_command(command, arg)
    }

    /// The raw per-command state machine, without APP_CMD handling.
    fn issue_command(&mut self, command: SdCmd, arg: u32) -> Result<u32, SdError> {
        let desc = command.descriptor();
        let arg = if desc.rca_arg { self.card.rca } else { arg };

        // Wait for the command line to go idle.
        let deadline = Deadline::after(&self.host, CMD_WAIT_US);
        loop {
            if self.host.read_reg(EMMC_STATUS) & SR_CMD_INHIBIT == 0 {
                break;
            }
            let pending = Interrupt::from_bits_retain(self.host.read_reg(EMMC_INTERRUPT));
            if pending.intersects(Interrupt::ERROR_MASK) || deadline.expired(&self.host) {
                self.log_registers("command line busy");
                return Err(SdError::Busy);
            }
            core::hint::spin_loop();
        }

        // Flush stale interrupt flags (write-1-to-clear).
        let pending = self.host.read_reg(EMMC_INTERRUPT);
        self.host.write_reg(EMMC_INTERRUPT, pending);

        self.host.write_reg(EMMC_ARG1, arg);
        self.host.write_reg(EMMC_CMDTM, desc.cmdtm());
        if desc.settle_us > 0 {
            self.host.delay_us(desc.settle_us);
        }

        self.wait_interrupt(Interrupt::CMD_DONE, CMD_WAIT_US)?;
        self.decode_response(command, arg)
    }

    /// Poll the interrupt register for `wanted` or any error flag.
    ///
    /// On success only the awaited flags are cleared, leaving unrelated
    /// pending interrupts (e.g. card insertion) for their own consumers. On
    /// an error or an expired budget every observed flag is cleared.
    fn wait_interrupt(&mut self, wanted: Interrupt, budget_us: u64) -> Result<(), SdError> {
        let deadline = Deadline::after(&self.host, budget_us);
        let pending = loop {
            let pending = Interrupt::from_bits_retain(self.host.read_reg(EMMC_INTERRUPT));
            if pending.intersects(wanted | Interrupt::ERROR_MASK) {
                break pending;
            }
            if deadline.expired(&self.host) {
                self.log_registers("interrupt wait expired");
                self.host.write_reg(EMMC_INTERRUPT, pending.bits());
                return Err(SdError::Timeout);
            }
            core::hint::spin_loop();
        };

        if pending.intersects(Interrupt::TIMEOUT_MASK) {
            self.host.write_reg(EMMC_INTERRUPT, pending.bits());
            return Err(SdError::Timeout);
        }
        if pending.intersects(Interrupt::ERROR_MASK) {
            self.log_registers("error interrupt");
            self.host.write_reg(EMMC_INTERRUPT, pending.bits());
            return Err(SdError::Card);
        }

        self.host.write_reg(EMMC_INTERRUPT, (pending & wanted).bits());
        Ok(())
    }

    /// Decode the response registers according to the command's descriptor
    /// and update the card session.
    fn decode_response(&mut self, command: SdCmd, sent_arg: u32) -> Result<u32, SdError> {
        let desc = command.descriptor();
        match desc.response {
            ResponseKind::None => Ok(0),

            ResponseKind::R48Busy => {
                let resp0 = self.host.read_reg(EMMC_RESP0);
                self.store_status(resp0)?;
                Ok(resp0)
            }

            ResponseKind::R48 => {
                let resp0 = self.host.read_reg(EMMC_RESP0);
                match command {
                    SdCmd::SendRelAddr => {
                        // R6: RCA in the top half; the low half scatters
                        // three status bits that R1 keeps at 19/22/23.
                        self.card.rca = resp0 & 0xFFFF_0000;
                        let status = (resp0 & 0x1FFF)
                            | ((resp0 & 0x2000) << 6)
                            | ((resp0 & 0x4000) << 8)
                            | ((resp0 & 0x8000) << 8);
                        self.store_status(status)?;
                        Ok(resp0)
                    }
                    SdCmd::IoSendOpCond | SdCmd::SdSendOpCond => {
                        // R3/R4 carry the OCR; busy-polling is the caller's
                        // job, so this is never an error by itself.
                        self.card.ocr = card::Ocr(resp0);
                        Ok(resp0)
                    }
                    SdCmd::SendIfCond => {
                        // R7 echoes the voltage range and check pattern.
                        if resp0 == sent_arg {
                            Ok(resp0)
                        } else {
                            log::debug!(
                                "EMMC: SEND_IF_COND echo mismatch: sent {:#x}, got {:#x}",
                                sent_arg,
                                resp0
                            );
                            Err(SdError::Card)
                        }
                    }
                    _ => {
                        self.store_status(resp0)?;
                        Ok(resp0)
                    }
                }
            }

            ResponseKind::R136 => {
                let words = [
                    self.host.read_reg(EMMC_RESP0),
                    self.host.read_reg(EMMC_RESP1),
                    self.host.read_reg(EMMC_RESP2),
                    self.host.read_reg(EMMC_RESP3),
                ];
                match command {
                    SdCmd::AllSendCid | SdCmd::SendCid => {
                        self.card.cid = card::Cid::parse(&words);
                    }
                    SdCmd::SendCsd => {
                        self.card.csd = card::Csd::parse(&words);
                    }
                    _ => {}
                }
                Ok(words[0])
            }
        }
    }

    /// Record an R1 status word; card-reported error bits fail the command.
    fn store_status(&mut self, status: u32) -> Result<(), SdError> {
        self.card.status = CardStatus::from_bits_retain(status);
        let errors = self.card.status & CardStatus::ERRORS;
        if errors.is_empty() {
            Ok(())
        } else {
            log::debug!("EMMC: card reported errors: {:?}", errors);
            Err(SdError::Card)
        }
    }

    // ========================================================================
    // Controller Bring-up and Card Initialization
    // ========================================================================

    /// Reset and bring up the host controller without identifying a card.
    ///
    /// This is sufficient when the bus hosts a non-storage SDIO peripheral
    /// (the onboard WiFi chip) driven through [`Self::send_command`].
    pub fn initialize(&mut self) -> Result<(), SdError> {
        self.version = host_spec_version(self.host.read_reg(EMMC_SLOTISR_VER));

        self.host.write_reg(EMMC_CONTROL0, 0);
        self.host.write_reg(EMMC_CONTROL1, 0);
        self.host.write_reg(EMMC_CONTROL1, C1_SRST_HC);
        self.host.delay_us(10);

        let deadline = Deadline::after(&self.host, SHORT_WAIT_US);
        while self.host.read_reg(EMMC_CONTROL1) & C1_SRST_HC != 0 {
            if deadline.expired(&self.host) {
                log::error!("EMMC: host circuit reset did not complete");
                return Err(SdError::Reset);
            }
            self.host.delay_us(10);
        }

        let control1 = self.host.read_reg(EMMC_CONTROL1) | C1_DATA_TOUNIT_MAX | C1_CLK_INTLEN;
        self.host.write_reg(EMMC_CONTROL1, control1);
        self.set_clock(INIT_CLOCK_HZ)?;

        self.host.write_reg(EMMC_IRPT_EN, 0xFFFF_FFFF);
        self.host.write_reg(EMMC_IRPT_MASK, 0xFFFF_FFFF);

        self.card = CardState::default();
        Ok(())
    }

    /// Full SD card identification sequence.
    ///
    /// Resets the controller and the session, then walks the power-up
    /// protocol: GO_IDLE, interface-condition probe, operating-condition
    /// poll, CID/RCA/CSD acquisition, card select, SCR read, bus-width
    /// switch and block-length fix. Any step's failure aborts with that
    /// step's error; the whole sequence may simply be retried.
    pub fn init_card(&mut self) -> Result<(), SdError> {
        self.initialize()?;
        self.send_command(SdCmd::GoIdleState, 0)?;

        match self.send_command(SdCmd::SendIfCond, IF_COND_CHECK) {
            Ok(_) => {
                // v2 card: poll ACMD41 with host-capacity support.
                self.wait_op_cond(ACMD41_ARG_HC)?;
                self.card.card_type = if self.card.ocr.card_capacity() {
                    CardType::Sd2Hc
                } else {
                    CardType::Sd2Sc
                };
                if !self.card.ocr.supports_3v3() {
                    log::error!(
                        "EMMC: card voltage window {:#010x} excludes 3.3V",
                        self.card.ocr.0
                    );
                    return Err(SdError::Voltage);
                }
            }
            Err(SdError::Busy) => return Err(SdError::Busy),
            Err(_) => {
                // No response to CMD8: legacy (v1) card. If the probe left
                // the command line wedged, start over from reset.
                if self.host.read_reg(EMMC_STATUS) & SR_CMD_INHIBIT != 0 {
                    self.initialize()?;
                    self.send_command(SdCmd::GoIdleState, 0)?;
                }
                self.wait_op_cond(ACMD41_ARG_SC)?;
                self.card.card_type = CardType::Sd1;
            }
        }

        self.send_command(SdCmd::AllSendCid, 0)?;
        self.send_command(SdCmd::SendRelAddr, 0)?;
        self.send_command(SdCmd::SendCsd, 0)?;

        self.set_clock(NORMAL_CLOCK_HZ)?;
        self.send_command(SdCmd::CardSelect, 0)?;

        self.read_scr()?;
        if self.card.scr.supports_4bit() {
            self.send_command(SdCmd::SetBusWidth, self.card.rca | 2)?;
            let control0 = self.host.read_reg(EMMC_CONTROL0) | C0_HCTL_DWIDTH;
            self.host.write_reg(EMMC_CONTROL0, control0);
        }
        self.send_command(SdCmd::SetBlocklen, SD_BLOCK_SIZE as u32)?;

        log::info!(
            "EMMC: {} \"{}\" ({}), {} MiB, RCA {:#06x}",
            self.card.card_type.name(),
            self.card.cid.name(),
            self.card.cid.manufacturer,
            self.card.capacity_bytes() / (1024 * 1024),
            self.card.rca >> 16
        );
        Ok(())
    }

    /// Poll ACMD41 until the card reports power-up complete.
    fn wait_op_cond(&mut self, arg: u32) -> Result<(), SdError> {
        for _ in 0..ACMD41_RETRIES {
            self.send_command(SdCmd::SdSendOpCond, arg)?;
            if self.card.ocr.powered_up() {
                return Ok(());
            }
            self.host.delay_us(ACMD41_RETRY_DELAY_US);
        }
        log::error!(
            "EMMC: card stayed busy through ACMD41 polling, OCR={:#010x}",
            self.card.ocr.0
        );
        Err(SdError::Timeout)
    }

    /// Read and decode the 8-byte SCR over the data lines.
    fn read_scr(&mut self) -> Result<(), SdError> {
        self.wait_data_idle(CMD_WAIT_US)?;

        self.host.write_reg(EMMC_BLKSIZECNT, (1 << 16) | 8);
        self.send_command(SdCmd::SendScr, 0)?;
        self.wait_interrupt(Interrupt::READ_RDY, DATA_WAIT_US)?;

        // Drain exactly two words; the FIFO may trickle.
        let mut words = [0u32; 2];
        let mut count = 0;
        let mut budget = FIFO_WAIT_US;
        while count < 2 && budget > 0 {
            if self.host.read_reg(EMMC_STATUS) & SR_READ_AVAILABLE != 0 {
                words[count] = self.host.read_reg(EMMC_DATA);
                count += 1;
            } else {
                self.host.delay_us(1);
                budget -= 1;
            }
        }
        if count < 2 {
            self.log_registers("SCR read starved");
            return Err(SdError::Timeout);
        }

        self.card.scr = card::Scr::parse(words);
        log::debug!(
            "EMMC: SCR: spec v{}, bus widths {:#x}, CMD23 {}",
            self.card.scr.spec_version,
            self.card.scr.bus_widths,
            self.card.scr.set_blkcnt_support
        );
        Ok(())
    }

    // ========================================================================
    // Block Transfer Engine
    // ========================================================================

    /// Read whole blocks starting at `start_block` into `buf`.
    ///
    /// `buf` must be a multiple of 512 bytes; its length determines the
    /// block count. Any alignment is accepted (misaligned buffers take the
    /// byte-shuffling path).
    pub fn read_blocks(&mut self, start_block: u32, buf: &mut [u8]) -> Result<(), SdError> {
        let blocks = Self::block_count(buf.len())?;
        self.transfer_blocks(start_block, blocks, buf.as_mut_ptr(), false)
    }

    /// Write whole blocks starting at `start_block` from `buf`.
    pub fn write_blocks(&mut self, start_block: u32, buf: &[u8]) -> Result<(), SdError> {
        let blocks = Self::block_count(buf.len())?;
        self.transfer_blocks(start_block, blocks, buf.as_ptr() as *mut u8, true)
    }

    fn block_count(len: usize) -> Result<u32, SdError> {
        if len == 0 || len % SD_BLOCK_SIZE != 0 {
            log::warn!("EMMC: buffer length {} is not a multiple of 512", len);
            return Err(SdError::Card);
        }
        let blocks = len / SD_BLOCK_SIZE;
        // BLKSIZECNT holds the count in a 16-bit field.
        if blocks > u16::MAX as usize {
            log::warn!("EMMC: {} blocks exceeds the 16-bit block counter", blocks);
            return Err(SdError::Card);
        }
        Ok(blocks as u32)
    }

    /// Address argument for a data/erase command: v2 standard-capacity cards
    /// are byte addressed, everything else takes the block number.
    fn block_address(&self, block: u32) -> u32 {
        if self.card.card_type == CardType::Sd2Sc {
            block << 9
        } else {
            block
        }
    }

    fn transfer_blocks(
        &mut self,
        start_block: u32,
        num_blocks: u32,
        buf: *mut u8,
        write: bool,
    ) -> Result<(), SdError> {
        if !self.card.card_type.is_known() {
            return Err(SdError::NoResponse);
        }
        self.wait_data_idle(DATA_WAIT_US)?;

        let multi = num_blocks > 1;
        let command = match (write, multi) {
            (false, false) => SdCmd::ReadSingle,
            (false, true) => SdCmd::ReadMulti,
            (true, false) => SdCmd::WriteSingle,
            (true, true) => SdCmd::WriteMulti,
        };

        // Cards that implement CMD23 take an explicit block count instead of
        // relying on auto-termination plus STOP_TRANS.
        let use_blkcnt = multi && self.card.scr.set_blkcnt_support;
        if use_blkcnt {
            self.send_command(SdCmd::SetBlockcnt, num_blocks)?;
        }

        self.host
            .write_reg(EMMC_BLKSIZECNT, (num_blocks << 16) | SD_BLOCK_SIZE as u32);
        self.send_command(command, self.block_address(start_block))?;

        let ready = if write {
            Interrupt::WRITE_RDY
        } else {
            Interrupt::READ_RDY
        };

        let mut done: u32 = 0;
        while done < num_blocks {
            if let Err(e) = self.wait_interrupt(ready, DATA_WAIT_US) {
                log::error!(
                    "EMMC: {} stalled after {}/{} blocks",
                    if write { "write" } else { "read" },
                    done,
                    num_blocks
                );
                self.log_registers("block transfer stalled");
                if !write && multi {
                    // Best effort; the original failure is what we report.
                    let _ = self.send_command(SdCmd::StopTrans, 0);
                }
                return Err(e);
            }
            unsafe {
                self.pump_block(buf.add(done as usize * SD_BLOCK_SIZE), write);
            }
            done += 1;
        }

        if write {
            self.wait_interrupt(Interrupt::DATA_DONE, DATA_WAIT_US)?;
        }
        if multi && !use_blkcnt {
            self.send_command(SdCmd::StopTrans, 0)?;
        }
        Ok(())
    }

    /// Move one 512-byte block through the data FIFO.
    ///
    /// Word-aligned buffers go a word at a time; anything else is assembled
    /// byte-wise in little-endian order.
    ///
    /// # Safety
    /// `buf` must be valid for 512 bytes of reads (write) or writes (read).
    unsafe fn pump_block(&mut self, buf: *mut u8, write: bool) {
        if buf as usize % 4 == 0 {
            let words = buf as *mut u32;
            for i in 0..WORDS_PER_BLOCK {
                if write {
                    let w = unsafe { words.add(i).read() };
                    self.host.write_reg(EMMC_DATA, w);
                } else {
                    let w = self.host.read_reg(EMMC_DATA);
                    unsafe { words.add(i).write(w) };
                }
            }
        } else {
            for i in 0..WORDS_PER_BLOCK {
                if write {
                    let mut w: u32 = 0;
                    for b in 0..4 {
                        w |= (unsafe { buf.add(i * 4 + b).read() } as u32) << (8 * b);
                    }
                    self.host.write_reg(EMMC_DATA, w);
                } else {
                    let w = self.host.read_reg(EMMC_DATA);
                    for b in 0..4 {
                        unsafe { buf.add(i * 4 + b).write((w >> (8 * b)) as u8) };
                    }
                }
            }
        }
    }

    // ========================================================================
    // Erase Operation
    // ========================================================================

    /// Erase `num_blocks` blocks starting at `start_block`.
    ///
    /// Issues the erase-range pair and ERASE, then polls data-inhibit to
    /// completion. Worst case is on the order of ten seconds.
    pub fn erase_blocks(&mut self, start_block: u32, num_blocks: u32) -> Result<(), SdError> {
        if !self.card.card_type.is_known() {
            return Err(SdError::NoResponse);
        }
        if num_blocks == 0 {
            return Ok(());
        }

        self.send_command(SdCmd::EraseWrSt, self.block_address(start_block))?;
        self.send_command(
            SdCmd::EraseWrEnd,
            self.block_address(start_block + num_blocks - 1),
        )?;
        self.send_command(SdCmd::Erase, 0)?;

        for _ in 0..ERASE_POLL_ITERS {
            if self.host.read_reg(EMMC_STATUS) & SR_DAT_INHIBIT == 0 {
                return Ok(());
            }
            self.host.delay_us(ERASE_POLL_STEP_US);
        }
        self.log_registers("erase never completed");
        Err(SdError::Timeout)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Bounded wait for the data lines to go idle.
    fn wait_data_idle(&mut self, budget_us: u64) -> Result<(), SdError> {
        let deadline = Deadline::after(&self.host, budget_us);
        while self.host.read_reg(EMMC_STATUS) & SR_DAT_INHIBIT != 0 {
            if deadline.expired(&self.host) {
                self.log_registers("data lines never went idle");
                return Err(SdError::Timeout);
            }
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Snapshot the registers that matter for postmortem diagnosis.
    fn log_registers(&self, context: &str) {
        log::error!(
            "EMMC: {}: status={:#010x} interrupt={:#010x} resp0={:#010x}",
            context,
            self.host.read_reg(EMMC_STATUS),
            self.host.read_reg(EMMC_INTERRUPT),
            self.host.read_reg(EMMC_RESP0)
        );
    }
}

// ============================================================================
// Global Controller Management
// ============================================================================

/// The process-wide controller used by the free-function API below.
static EMMC: Mutex<Option<EmmcController<MmioHost>>> = Mutex::new(None);

/// Probe and identify the SD card on the default Pi 3 EMMC controller,
/// storing it for the free-function wrappers.
pub fn init() -> Result<(), SdError> {
    let mut controller = EmmcController::new(MmioHost::new(), DEFAULT_BASE_CLOCK_HZ);
    controller.log_controller_info();
    controller.init_card()?;
    *EMMC.lock() = Some(controller);
    Ok(())
}

/// Bring up the controller without card identification (SDIO/WiFi bus).
pub fn init_bus_only() -> Result<(), SdError> {
    let mut controller = EmmcController::new(MmioHost::new(), DEFAULT_BASE_CLOCK_HZ);
    controller.initialize()?;
    *EMMC.lock() = Some(controller);
    Ok(())
}

/// Run `f` against the global controller, if one has been initialized.
fn with_controller<R>(
    f: impl FnOnce(&mut EmmcController<MmioHost>) -> Result<R, SdError>,
) -> Result<R, SdError> {
    match EMMC.lock().as_mut() {
        Some(controller) => f(controller),
        None => {
            log::error!("EMMC: used before init()");
            Err(SdError::NoResponse)
        }
    }
}

/// Read blocks through the global controller, collapsing the cause to a
/// success flag. Callers that need the specific error use the controller
/// handle directly.
pub fn read_blocks(start_block: u32, buf: &mut [u8]) -> bool {
    with_controller(|c| c.read_blocks(start_block, buf)).is_ok()
}

/// Write blocks through the global controller; see [`read_blocks`].
pub fn write_blocks(start_block: u32, buf: &[u8]) -> bool {
    with_controller(|c| c.write_blocks(start_block, buf)).is_ok()
}

/// Erase blocks through the global controller.
pub fn erase_blocks(start_block: u32, num_blocks: u32) -> Result<(), SdError> {
    with_controller(|c| c.erase_blocks(start_block, num_blocks))
}

/// Issue a raw command through the global controller. Used by the SDIO/WiFi
/// layer for IO_RW_DIRECT / IO_SEND_OP_COND traffic.
pub fn send_command(command: SdCmd, arg: u32) -> Result<u32, SdError> {
    with_controller(|c| c.send_command(command, arg))
}
