//! SD Command Table
//!
//! One unified, compile-time table of every command the driver issues,
//! indexed by the logical [`SdCmd`] enumeration. Each descriptor carries the
//! 6-bit hardware command index, the response kind, the data phase (if any),
//! whether the transfer-mode multi-block bits are set, whether the argument
//! is the card's RCA, whether an APP_CMD prefix is required, and a
//! post-issue settle delay.

use super::regs::*;

/// Response kind of an SD command, as encoded in the CMDTM response field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// No response
    None,
    /// 48-bit response (R1/R3/R4/R6/R7)
    R48,
    /// 48-bit response using the busy signal (R1b)
    R48Busy,
    /// 136-bit response (R2: CID or CSD)
    R136,
}

/// Direction of a command's data phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    Read,
    Write,
}

/// Static description of one SD command.
#[derive(Debug, Clone, Copy)]
pub struct CmdDescriptor {
    /// 6-bit hardware command index.
    pub hw_index: u8,
    pub response: ResponseKind,
    /// Data phase and its direction, if the command moves data.
    pub data: Option<DataDirection>,
    /// Multi-block transfer with block-count auto-termination.
    pub multiblock: bool,
    /// The argument must be the card's RCA.
    pub rca_arg: bool,
    /// Requires an APP_CMD (CMD55) prefix.
    pub app_cmd: bool,
    /// Response CRC check is meaningful (off for R3/R4 op-cond responses).
    pub crc_check: bool,
    /// Busy-wait after issuing, before polling for completion.
    pub settle_us: u32,
}

impl CmdDescriptor {
    const fn new(hw_index: u8, response: ResponseKind) -> Self {
        Self {
            hw_index,
            response,
            data: None,
            multiblock: false,
            rca_arg: false,
            app_cmd: false,
            crc_check: !matches!(response, ResponseKind::None),
            settle_us: 0,
        }
    }

    const fn read(mut self) -> Self {
        self.data = Some(DataDirection::Read);
        self
    }

    const fn write(mut self) -> Self {
        self.data = Some(DataDirection::Write);
        self
    }

    const fn multi(mut self) -> Self {
        self.multiblock = true;
        self
    }

    const fn rca(mut self) -> Self {
        self.rca_arg = true;
        self
    }

    const fn app(mut self) -> Self {
        self.app_cmd = true;
        self
    }

    const fn no_crc(mut self) -> Self {
        self.crc_check = false;
        self
    }

    const fn settle(mut self, us: u32) -> Self {
        self.settle_us = us;
        self
    }

    /// Encode the descriptor into a CMDTM register value.
    pub const fn cmdtm(&self) -> u32 {
        let mut v = (self.hw_index as u32) << CMD_INDEX_SHIFT;
        v |= match self.response {
            ResponseKind::None => CMD_RSPNS_NONE,
            ResponseKind::R48 => CMD_RSPNS_48,
            ResponseKind::R48Busy => CMD_RSPNS_48_BUSY,
            ResponseKind::R136 => CMD_RSPNS_136,
        };
        if self.crc_check && !matches!(self.response, ResponseKind::None) {
            v |= CMD_CRCCHK_EN;
        }
        if self.crc_check && matches!(self.response, ResponseKind::R48 | ResponseKind::R48Busy) {
            v |= CMD_IXCHK_EN;
        }
        match self.data {
            Some(DataDirection::Read) => v |= CMD_ISDATA | TM_DAT_DIR,
            Some(DataDirection::Write) => v |= CMD_ISDATA,
            None => {}
        }
        if self.multiblock {
            v |= TM_MULTI_BLOCK | TM_BLKCNT_EN | TM_AUTO_CMD12;
        }
        v
    }
}

/// Logical command index.
///
/// Everything from [`SdCmd::SetBusWidth`] on is an application-specific
/// command and is transparently prefixed with APP_CMD by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdCmd {
    GoIdleState,
    AllSendCid,
    SendRelAddr,
    SetDsr,
    IoSendOpCond,
    SwitchFunc,
    CardSelect,
    SendIfCond,
    SendCsd,
    SendCid,
    VoltageSwitch,
    StopTrans,
    SendStatus,
    GoInactive,
    SetBlocklen,
    ReadSingle,
    ReadMulti,
    SendTuning,
    SpeedClass,
    SetBlockcnt,
    WriteSingle,
    WriteMulti,
    ProgramCsd,
    SetWriteProt,
    ClrWriteProt,
    SendWriteProt,
    EraseWrSt,
    EraseWrEnd,
    Erase,
    LockUnlock,
    IoRwDirect,
    GenCmd,
    AppCmd,
    AppCmdRca,
    SetBusWidth,
    SdStatus,
    SendNumWrbl,
    SendNumErs,
    SdSendOpCond,
    SetClrDet,
    SendScr,
}

impl SdCmd {
    /// Static descriptor for this command.
    pub const fn descriptor(self) -> CmdDescriptor {
        use ResponseKind::*;
        match self {
            SdCmd::GoIdleState => CmdDescriptor::new(0, None),
            SdCmd::AllSendCid => CmdDescriptor::new(2, R136),
            SdCmd::SendRelAddr => CmdDescriptor::new(3, R48),
            SdCmd::SetDsr => CmdDescriptor::new(4, None),
            SdCmd::IoSendOpCond => CmdDescriptor::new(5, R48).no_crc(),
            SdCmd::SwitchFunc => CmdDescriptor::new(6, R48),
            SdCmd::CardSelect => CmdDescriptor::new(7, R48Busy).rca(),
            SdCmd::SendIfCond => CmdDescriptor::new(8, R48).settle(100),
            SdCmd::SendCsd => CmdDescriptor::new(9, R136).rca(),
            SdCmd::SendCid => CmdDescriptor::new(10, R136).rca(),
            SdCmd::VoltageSwitch => CmdDescriptor::new(11, R48),
            SdCmd::StopTrans => CmdDescriptor::new(12, R48Busy),
            SdCmd::SendStatus => CmdDescriptor::new(13, R48).rca(),
            SdCmd::GoInactive => CmdDescriptor::new(15, None).rca(),
            SdCmd::SetBlocklen => CmdDescriptor::new(16, R48),
            SdCmd::ReadSingle => CmdDescriptor::new(17, R48).read(),
            SdCmd::ReadMulti => CmdDescriptor::new(18, R48).read().multi(),
            SdCmd::SendTuning => CmdDescriptor::new(19, R48).read(),
            SdCmd::SpeedClass => CmdDescriptor::new(20, R48Busy),
            SdCmd::SetBlockcnt => CmdDescriptor::new(23, R48),
            SdCmd::WriteSingle => CmdDescriptor::new(24, R48).write(),
            SdCmd::WriteMulti => CmdDescriptor::new(25, R48).write().multi(),
            SdCmd::ProgramCsd => CmdDescriptor::new(27, R48),
            SdCmd::SetWriteProt => CmdDescriptor::new(28, R48Busy),
            SdCmd::ClrWriteProt => CmdDescriptor::new(29, R48Busy),
            SdCmd::SendWriteProt => CmdDescriptor::new(30, R48),
            SdCmd::EraseWrSt => CmdDescriptor::new(32, R48),
            SdCmd::EraseWrEnd => CmdDescriptor::new(33, R48),
            SdCmd::Erase => CmdDescriptor::new(38, R48Busy),
            SdCmd::LockUnlock => CmdDescriptor::new(42, R48),
            SdCmd::IoRwDirect => CmdDescriptor::new(52, R48),
            SdCmd::GenCmd => CmdDescriptor::new(56, R48),
            // Bare APP_CMD is used before an RCA exists; the card cannot be
            // addressed yet, so no response is expected.
            SdCmd::AppCmd => CmdDescriptor::new(55, None).settle(100),
            SdCmd::AppCmdRca => CmdDescriptor::new(55, R48).rca(),
            SdCmd::SetBusWidth => CmdDescriptor::new(6, R48).app(),
            SdCmd::SdStatus => CmdDescriptor::new(13, R48).rca().app(),
            SdCmd::SendNumWrbl => CmdDescriptor::new(22, R48).app(),
            SdCmd::SendNumErs => CmdDescriptor::new(23, R48).app(),
            SdCmd::SdSendOpCond => CmdDescriptor::new(41, R48).no_crc().settle(1000).app(),
            SdCmd::SetClrDet => CmdDescriptor::new(42, R48).app(),
            SdCmd::SendScr => CmdDescriptor::new(51, R48).read().app(),
        }
    }

    /// All logical commands, in table order.
    pub const ALL: [SdCmd; 41] = [
        SdCmd::GoIdleState,
        SdCmd::AllSendCid,
        SdCmd::SendRelAddr,
        SdCmd::SetDsr,
        SdCmd::IoSendOpCond,
        SdCmd::SwitchFunc,
        SdCmd::CardSelect,
        SdCmd::SendIfCond,
        SdCmd::SendCsd,
        SdCmd::SendCid,
        SdCmd::VoltageSwitch,
        SdCmd::StopTrans,
        SdCmd::SendStatus,
        SdCmd::GoInactive,
        SdCmd::SetBlocklen,
        SdCmd::ReadSingle,
        SdCmd::ReadMulti,
        SdCmd::SendTuning,
        SdCmd::SpeedClass,
        SdCmd::SetBlockcnt,
        SdCmd::WriteSingle,
        SdCmd::WriteMulti,
        SdCmd::ProgramCsd,
        SdCmd::SetWriteProt,
        SdCmd::ClrWriteProt,
        SdCmd::SendWriteProt,
        SdCmd::EraseWrSt,
        SdCmd::EraseWrEnd,
        SdCmd::Erase,
        SdCmd::LockUnlock,
        SdCmd::IoRwDirect,
        SdCmd::GenCmd,
        SdCmd::AppCmd,
        SdCmd::AppCmdRca,
        SdCmd::SetBusWidth,
        SdCmd::SdStatus,
        SdCmd::SendNumWrbl,
        SdCmd::SendNumErs,
        SdCmd::SdSendOpCond,
        SdCmd::SetClrDet,
        SdCmd::SendScr,
    ];
}
