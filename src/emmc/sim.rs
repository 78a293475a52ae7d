//! Simulated EMMC controller and card for the unit tests.
//!
//! [`SimHost`] implements [`Host`] over a register-level model of the
//! controller with one attached card. The model is deliberately shallow: it
//! executes commands at the CMDTM write, synthesizes the interrupt and
//! status registers the driver polls, and keeps a byte array as the card's
//! storage. Config flags fault individual behaviors so each error path can
//! be exercised.
//!
//! The fake clock advances one microsecond per `ticks()` call and by the
//! requested amount per `delay_us()`, so every bounded wait in the driver
//! terminates deterministically.

use super::regs::*;
use crate::hal::Host;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// What kind of card answers on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Personality {
    /// SD v2 high capacity: answers CMD8, OCR reports CCS, CSD v2.
    V2Hc,
    /// SD v2 standard capacity: answers CMD8, no CCS, CSD v1, byte addressed.
    V2Sc,
    /// SD v1: CMD8 times out, CSD v1.
    V1,
}

/// Default simulated storage: 64 blocks.
const STORAGE_BLOCKS: usize = 64;

pub struct SimState {
    now: u64,

    // Registers the driver writes and reads back.
    blksizecnt: u32,
    arg1: u32,
    resp: [u32; 4],
    control0: u32,
    control1: u32,
    interrupt: u32,
    irpt_en: u32,
    irpt_mask: u32,
    slotisr_ver: u32,

    // Fault injection.
    pub personality: Personality,
    /// Controller never completes any command.
    pub dead: bool,
    /// Clock never reports stable after enable.
    pub clock_never_stable: bool,
    /// Host circuit reset never self-clears.
    pub stuck_reset: bool,
    /// Command and data lines report busy forever.
    pub busy_lines: bool,
    /// Blocks arrive without the read-ready interrupt.
    pub suppress_read_rdy: bool,
    /// CMD55 responses carry the APP_CMD acknowledgment bit.
    pub acks_app_cmd: bool,
    /// CMD8 completes but echoes a corrupted pattern.
    pub if_cond_garbage: bool,
    /// OCR voltage window bits (defaults to the full 2.7-3.6 V window).
    pub ocr_window: u32,
    /// ACMD41 polls before the card reports powered up.
    pub acmd41_polls_needed: u32,
    /// SCR register value, split as (bits 63:32, bits 31:0).
    pub scr: (u32, u32),

    // Card model.
    acmd41_polls_seen: u32,
    app_next: bool,
    rca: u32,
    status_resp: u32,
    pub storage: Vec<u8>,

    // Active data transfer.
    fifo: VecDeque<u32>,
    xfer_offset: usize,
    xfer_blocks_left: u32,
    xfer_is_write: bool,
    write_words: Vec<u32>,
    erase_busy_polls: u32,

    // Recorders the tests assert on.
    /// Every (command index, argument) issued, in order.
    pub issued: Vec<(u8, u32)>,
    /// Argument of the last data or erase-range command.
    pub last_data_addr: Option<u32>,
    /// Argument of the last SET_BLOCKCNT.
    pub blkcnt_cmd: Option<u32>,
    pub erase_start: Option<u32>,
    pub erase_end: Option<u32>,
    pub stop_trans_count: u32,
}

impl SimState {
    fn new(personality: Personality) -> Self {
        Self {
            now: 0,
            blksizecnt: 0,
            arg1: 0,
            resp: [0; 4],
            control0: 0,
            control1: 0,
            interrupt: 0,
            irpt_en: 0,
            irpt_mask: 0,
            slotisr_ver: HOST_SPEC_V3 << SLOTISR_SDVERSION_SHIFT,
            personality,
            dead: false,
            clock_never_stable: false,
            stuck_reset: false,
            busy_lines: false,
            suppress_read_rdy: false,
            acks_app_cmd: true,
            if_cond_garbage: false,
            ocr_window: 0x00FF_8000,
            acmd41_polls_needed: 2,
            // SD_SPEC=2 + SPEC3, 1-bit and 4-bit widths, CMD23 (SCR bit 33)
            // supported.
            scr: ((2 << 24) | (1 << 15) | (0x5 << 16) | (1 << 1), 0),
            acmd41_polls_seen: 0,
            app_next: false,
            rca: 0xAAAA,
            status_resp: 0x0000_0900,
            storage: vec![0; STORAGE_BLOCKS * 512],
            fifo: VecDeque::new(),
            xfer_offset: 0,
            xfer_blocks_left: 0,
            xfer_is_write: false,
            write_words: Vec::new(),
            erase_busy_polls: 0,
            issued: Vec::new(),
            last_data_addr: None,
            blkcnt_cmd: None,
            erase_start: None,
            erase_end: None,
            stop_trans_count: 0,
        }
    }

    /// Canned CID: manufacturer 0x03, product "SIM64".
    fn cid_words(&self) -> [u32; 4] {
        [
            (0x0042u32 << 16) | (20 << 4) | 6,
            0x0042 | (0x10 << 16) | ((b'4' as u32) << 24),
            u32::from_be_bytes(*b"SIM6"),
            (0x03 << 16) | u32::from_be_bytes([0, 0, b'S', b'D']),
        ]
    }

    /// Canned CSD matching the personality: 8 GiB v2 or 1 GiB v1 geometry.
    fn csd_words(&self) -> [u32; 4] {
        match self.personality {
            Personality::V2Hc => [0, 16383 << 8, 0, 1 << 22],
            Personality::V2Sc | Personality::V1 => {
                // c_size=4095 (split 10+2), c_size_mult=7, read_bl_len=9.
                [0, (0x3FF << 22) | (7 << 7), (9 << 8) | 0x3, 0]
            }
        }
    }

    /// True when data/erase command arguments are byte addresses.
    fn byte_addressed(&self) -> bool {
        self.personality == Personality::V2Sc
    }

    fn storage_offset(&self, addr: u32) -> usize {
        if self.byte_addressed() {
            addr as usize
        } else {
            addr as usize * 512
        }
    }

    fn load_read_block(&mut self) {
        for i in 0..128 {
            let o = self.xfer_offset + i * 4;
            let w = u32::from_le_bytes([
                self.storage[o],
                self.storage[o + 1],
                self.storage[o + 2],
                self.storage[o + 3],
            ]);
            self.fifo.push_back(w);
        }
        self.xfer_offset += 512;
        if !self.suppress_read_rdy {
            self.interrupt |= Interrupt::READ_RDY.bits();
        }
    }

    fn start_read(&mut self, addr: u32, blocks: u32) {
        self.last_data_addr = Some(addr);
        self.xfer_offset = self.storage_offset(addr);
        self.xfer_blocks_left = blocks;
        self.xfer_is_write = false;
        self.fifo.clear();
        self.load_read_block();
        self.xfer_blocks_left -= 1;
    }

    fn start_write(&mut self, addr: u32, blocks: u32) {
        self.last_data_addr = Some(addr);
        self.xfer_offset = self.storage_offset(addr);
        self.xfer_blocks_left = blocks;
        self.xfer_is_write = true;
        self.write_words.clear();
        self.interrupt |= Interrupt::WRITE_RDY.bits();
    }

    /// Execute the command latched by a CMDTM write.
    fn execute(&mut self, cmdtm: u32) {
        if self.dead {
            return;
        }

        let index = cmdtm_index(cmdtm);
        let arg = self.arg1;
        let app = self.app_next;
        self.app_next = false;
        self.issued.push((index, arg));
        self.resp = [0; 4];

        match (index, app) {
            (0, _) => {}
            (2, _) | (10, _) => self.resp = self.cid_words(),
            (3, _) => self.resp[0] = (self.rca << 16) | 0x0500,
            (5, _) => self.resp[0] = 0x90FF_0000,
            (7, _) | (16, _) => self.resp[0] = self.status_resp,
            (8, _) => {
                if self.personality == Personality::V1 && !self.if_cond_garbage {
                    // No reply: command response timeout.
                    self.interrupt |= (Interrupt::ERR | Interrupt::CTO_ERR).bits();
                    return;
                }
                self.resp[0] = if self.if_cond_garbage { arg ^ 0xFF } else { arg };
            }
            (9, _) => self.resp = self.csd_words(),
            (12, _) => {
                self.stop_trans_count += 1;
                self.resp[0] = self.status_resp;
            }
            (17, _) => self.start_read(arg, 1),
            (18, _) => self.start_read(arg, self.blksizecnt >> 16),
            (23, false) => self.blkcnt_cmd = Some(arg),
            (24, _) => self.start_write(arg, 1),
            (25, _) => self.start_write(arg, self.blksizecnt >> 16),
            (32, _) => self.erase_start = Some(arg),
            (33, _) => self.erase_end = Some(arg),
            (38, _) => {
                self.erase_busy_polls = 3;
                self.resp[0] = self.status_resp;
            }
            (41, true) => {
                self.acmd41_polls_seen += 1;
                let mut ocr = self.ocr_window;
                if self.acmd41_polls_seen >= self.acmd41_polls_needed {
                    ocr |= 1 << 31;
                    if self.personality == Personality::V2Hc && arg & (1 << 30) != 0 {
                        ocr |= 1 << 30;
                    }
                }
                self.resp[0] = ocr;
            }
            (51, true) => {
                self.fifo.clear();
                self.fifo.push_back(self.scr.0.swap_bytes());
                self.fifo.push_back(self.scr.1.swap_bytes());
                self.xfer_blocks_left = 0;
                self.xfer_is_write = false;
                self.interrupt |= Interrupt::READ_RDY.bits();
            }
            (52, _) => self.resp[0] = 0x1001,
            (55, _) => {
                self.app_next = true;
                self.resp[0] = if self.acks_app_cmd {
                    self.status_resp | 0x20
                } else {
                    self.status_resp
                };
            }
            _ => self.resp[0] = self.status_resp,
        }

        self.interrupt |= Interrupt::CMD_DONE.bits();
    }

    fn data_read(&mut self) -> u32 {
        let word = self.fifo.pop_front().unwrap_or(0);
        if self.fifo.is_empty() && !self.xfer_is_write {
            if self.xfer_blocks_left > 0 {
                self.load_read_block();
                self.xfer_blocks_left -= 1;
            } else {
                self.interrupt |= Interrupt::DATA_DONE.bits();
            }
        }
        word
    }

    fn data_write(&mut self, word: u32) {
        self.write_words.push(word);
        if self.write_words.len() == 128 {
            for (i, w) in self.write_words.iter().enumerate() {
                self.storage[self.xfer_offset + i * 4..self.xfer_offset + i * 4 + 4]
                    .copy_from_slice(&w.to_le_bytes());
            }
            self.write_words.clear();
            self.xfer_offset += 512;
            self.xfer_blocks_left -= 1;
            if self.xfer_blocks_left > 0 {
                self.interrupt |= Interrupt::WRITE_RDY.bits();
            } else {
                self.interrupt |= Interrupt::DATA_DONE.bits();
            }
        }
    }

    fn status(&mut self) -> u32 {
        let mut status = 0;
        if self.busy_lines {
            status |= SR_CMD_INHIBIT | SR_DAT_INHIBIT;
        }
        if self.erase_busy_polls > 0 {
            self.erase_busy_polls -= 1;
            status |= SR_DAT_INHIBIT;
        }
        if !self.fifo.is_empty() {
            status |= SR_READ_AVAILABLE;
        }
        if self.xfer_is_write && self.xfer_blocks_left > 0 {
            status |= SR_WRITE_AVAILABLE;
        }
        status
    }
}

/// [`Host`] over the shared simulator state.
pub struct SimHost {
    state: Rc<RefCell<SimState>>,
}

impl SimHost {
    pub fn new(personality: Personality) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::new(personality))),
        }
    }

    /// Shared handle for configuring faults and asserting on recorders.
    pub fn state(&self) -> Rc<RefCell<SimState>> {
        Rc::clone(&self.state)
    }
}

impl Host for SimHost {
    fn read_reg(&self, offset: u32) -> u32 {
        let mut s = self.state.borrow_mut();
        match offset {
            EMMC_BLKSIZECNT => s.blksizecnt,
            EMMC_ARG1 => s.arg1,
            EMMC_RESP0 => s.resp[0],
            EMMC_RESP1 => s.resp[1],
            EMMC_RESP2 => s.resp[2],
            EMMC_RESP3 => s.resp[3],
            EMMC_DATA => s.data_read(),
            EMMC_STATUS => s.status(),
            EMMC_CONTROL0 => s.control0,
            EMMC_CONTROL1 => s.control1,
            EMMC_INTERRUPT => s.interrupt,
            EMMC_IRPT_MASK => s.irpt_mask,
            EMMC_IRPT_EN => s.irpt_en,
            EMMC_SLOTISR_VER => s.slotisr_ver,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u32, value: u32) {
        let mut s = self.state.borrow_mut();
        match offset {
            EMMC_BLKSIZECNT => s.blksizecnt = value,
            EMMC_ARG1 => s.arg1 = value,
            EMMC_CMDTM => s.execute(value),
            EMMC_DATA => s.data_write(value),
            EMMC_CONTROL0 => s.control0 = value,
            EMMC_CONTROL1 => {
                let mut v = value;
                // Host circuit reset self-clears unless faulted.
                if v & C1_SRST_HC != 0 && !s.stuck_reset {
                    v &= !C1_SRST_HC;
                }
                // Internal clock stabilizes immediately unless faulted.
                if v & C1_CLK_EN != 0 && !s.clock_never_stable {
                    v |= C1_CLK_STABLE;
                } else {
                    v &= !C1_CLK_STABLE;
                }
                s.control1 = v;
            }
            EMMC_INTERRUPT => s.interrupt &= !value,
            EMMC_IRPT_MASK => s.irpt_mask = value,
            EMMC_IRPT_EN => s.irpt_en = value,
            _ => {}
        }
    }

    fn ticks(&self) -> u64 {
        let mut s = self.state.borrow_mut();
        s.now += 1;
        s.now
    }

    fn delay_us(&self, us: u32) {
        self.state.borrow_mut().now += us as u64;
    }
}
