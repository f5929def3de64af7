//! SD Host Controller register definitions
//!
//! Register map of the 32-bit wide SD host controller block (the layout
//! shared by the Freescale/NXP uSDHC and the Arasan-derived Broadcom
//! EMMC controllers). Offsets are byte offsets from the register base.

use bitflags::bitflags;
use tock_registers::fields::FieldValue;
use tock_registers::{LocalRegisterCopy, RegisterLongName, register_bitfields};

use crate::mmio::RegisterIo;

// ============================================================================
// Register Offsets
// ============================================================================

/// DMA System Address
pub const DS_ADDR: usize = 0x00;

/// Block Attributes (size and count)
pub const BLK_ATT: usize = 0x04;

/// Command Argument
pub const CMD_ARG: usize = 0x08;

/// Command Transfer Type
pub const CMD_XFR_TYP: usize = 0x0C;

/// Command Response 0
pub const CMD_RSP0: usize = 0x10;

/// Command Response 1
pub const CMD_RSP1: usize = 0x14;

/// Command Response 2
pub const CMD_RSP2: usize = 0x18;

/// Command Response 3
pub const CMD_RSP3: usize = 0x1C;

/// Data Buffer Access Port
pub const DATA_BUFF_ACC_PORT: usize = 0x20;

/// Present State
pub const PRES_STATE: usize = 0x24;

/// Protocol Control
pub const PROT_CTRL: usize = 0x28;

/// System Control (clock, timeout, resets)
pub const SYS_CTRL: usize = 0x2C;

/// Interrupt Status
pub const INT_STATUS: usize = 0x30;

/// Interrupt Status Enable
pub const INT_STATUS_EN: usize = 0x34;

/// Interrupt Signal Enable
pub const INT_SIGNAL_EN: usize = 0x38;

/// Auto CMD12 Error Status
pub const AUTOCMD12_ERR_STATUS: usize = 0x3C;

/// Host Controller Capabilities
pub const HOST_CTRL_CAP: usize = 0x40;

/// Watermark Level
pub const WTMK_LVL: usize = 0x44;

/// Mixer Control
pub const MIX_CTRL: usize = 0x48;

/// Force Event
pub const FORCE_EVENT: usize = 0x50;

/// ADMA Error Status
pub const ADMA_ERR_STATUS: usize = 0x54;

/// ADMA System Address
pub const ADMA_SYS_ADDR: usize = 0x58;

/// DLL (Delay Line) Control
pub const DLL_CTRL: usize = 0x60;

/// DLL Status
pub const DLL_STATUS: usize = 0x64;

/// Clock Tuning Control and Status
pub const CLK_TUNE_CTRL_STATUS: usize = 0x68;

/// Vendor Specific
pub const VEND_SPEC: usize = 0xC0;

/// MMC Boot
pub const MMC_BOOT: usize = 0xC4;

/// Vendor Specific 2
pub const VEND_SPEC2: usize = 0xC8;

/// Host Controller Version
pub const HOST_VERSION: usize = 0xFC;

/// Size of the register window
pub const REG_WINDOW_SIZE: usize = 0x100;

/// Registers that can be read without side effects, for diagnostics
pub const DUMP_REGISTERS: [(&str, usize); 26] = [
    ("DS_ADDR", DS_ADDR),
    ("BLK_ATT", BLK_ATT),
    ("CMD_ARG", CMD_ARG),
    ("CMD_XFR_TYP", CMD_XFR_TYP),
    ("CMD_RSP0", CMD_RSP0),
    ("CMD_RSP1", CMD_RSP1),
    ("CMD_RSP2", CMD_RSP2),
    ("CMD_RSP3", CMD_RSP3),
    ("PRES_STATE", PRES_STATE),
    ("PROT_CTRL", PROT_CTRL),
    ("SYS_CTRL", SYS_CTRL),
    ("INT_STATUS", INT_STATUS),
    ("INT_STATUS_EN", INT_STATUS_EN),
    ("INT_SIGNAL_EN", INT_SIGNAL_EN),
    ("AUTOCMD12_ERR_STATUS", AUTOCMD12_ERR_STATUS),
    ("HOST_CTRL_CAP", HOST_CTRL_CAP),
    ("WTMK_LVL", WTMK_LVL),
    ("MIX_CTRL", MIX_CTRL),
    ("FORCE_EVENT", FORCE_EVENT),
    ("ADMA_ERR_STATUS", ADMA_ERR_STATUS),
    ("ADMA_SYS_ADDR", ADMA_SYS_ADDR),
    ("DLL_CTRL", DLL_CTRL),
    ("DLL_STATUS", DLL_STATUS),
    ("CLK_TUNE_CTRL_STATUS", CLK_TUNE_CTRL_STATUS),
    ("VEND_SPEC", VEND_SPEC),
    ("HOST_VERSION", HOST_VERSION),
];

// ============================================================================
// Register Bitfield Definitions
// ============================================================================

register_bitfields! [
    u32,
    /// Block Attributes Register (0x04)
    pub BLK_ATT [
        /// Transfer block size in bytes
        BLKSIZE OFFSET(0) NUMBITS(13) [],
        /// Number of blocks
        BLKCNT OFFSET(16) NUMBITS(16) []
    ],

    /// Command Transfer Type Register (0x0C)
    pub CMD_XFR_TYP [
        /// DMA enable (mixer bits on v2+ controllers)
        DMAEN OFFSET(0) NUMBITS(1) [],
        /// Block count enable
        BCEN OFFSET(1) NUMBITS(1) [],
        /// Auto CMD12 enable
        AC12EN OFFSET(2) NUMBITS(1) [],
        /// Data transfer direction (1 = card to host)
        DTDSEL OFFSET(4) NUMBITS(1) [],
        /// Multi/single block select
        MSBSEL OFFSET(5) NUMBITS(1) [],
        /// Response type
        RSPTYP OFFSET(16) NUMBITS(2) [
            NoResponse = 0,
            Length136 = 1,
            Length48 = 2,
            Length48Busy = 3
        ],
        /// Command CRC check enable
        CCCEN OFFSET(19) NUMBITS(1) [],
        /// Command index check enable
        CICEN OFFSET(20) NUMBITS(1) [],
        /// Data present select
        DPSEL OFFSET(21) NUMBITS(1) [],
        /// Command type
        CMDTYP OFFSET(22) NUMBITS(2) [
            Normal = 0,
            Suspend = 1,
            Resume = 2,
            Abort = 3
        ],
        /// Command index
        CMDINX OFFSET(24) NUMBITS(6) []
    ],

    /// Present State Register (0x24)
    pub PRES_STATE [
        /// Command inhibit (CMD line)
        CIHB OFFSET(0) NUMBITS(1) [],
        /// Command inhibit (DAT lines)
        CDIHB OFFSET(1) NUMBITS(1) [],
        /// Data line active
        DLA OFFSET(2) NUMBITS(1) [],
        /// SD clock stable
        SDSTB OFFSET(3) NUMBITS(1) [],
        /// Write transfer active
        WTA OFFSET(8) NUMBITS(1) [],
        /// Read transfer active
        RTA OFFSET(9) NUMBITS(1) [],
        /// Buffer write enable
        BWEN OFFSET(10) NUMBITS(1) [],
        /// Buffer read enable
        BREN OFFSET(11) NUMBITS(1) [],
        /// Card inserted
        CINST OFFSET(16) NUMBITS(1) [],
        /// Card detect pin level
        CDPL OFFSET(18) NUMBITS(1) [],
        /// Write protect switch pin level (1 = read-only)
        WPSPL OFFSET(19) NUMBITS(1) [],
        /// DAT[7:0] line signal level
        DLSL OFFSET(24) NUMBITS(8) []
    ],

    /// Protocol Control Register (0x28)
    pub PROT_CTRL [
        /// LED control
        LCTL OFFSET(0) NUMBITS(1) [],
        /// Data transfer width
        DTW OFFSET(1) NUMBITS(2) [
            OneBit = 0,
            FourBit = 1,
            EightBit = 2
        ],
        /// DAT3 as card detection pin
        D3CD OFFSET(3) NUMBITS(1) [],
        /// Endian mode
        EMODE OFFSET(4) NUMBITS(2) [],
        /// DMA select
        DMASEL OFFSET(8) NUMBITS(2) [
            Simple = 0,
            Adma1 = 1,
            Adma2 = 2
        ]
    ],

    /// System Control Register (0x2C)
    pub SYS_CTRL [
        /// Internal clock enable
        CLK_INT_EN OFFSET(0) NUMBITS(1) [],
        /// Internal clock stable
        CLK_INT_STABLE OFFSET(1) NUMBITS(1) [],
        /// SD clock enable
        CLK_CARD_EN OFFSET(2) NUMBITS(1) [],
        /// Divisor (uSDHC: divide by DVS + 1)
        DVS OFFSET(4) NUMBITS(4) [],
        /// Upper two bits of the 10-bit divided clock select
        SDCLK_UPPER OFFSET(6) NUMBITS(2) [],
        /// SD clock frequency select / prescaler
        SDCLKS OFFSET(8) NUMBITS(8) [],
        /// Data timeout counter value (SDCLK << (DTOCV + 13))
        DTOCV OFFSET(16) NUMBITS(4) [],
        /// Software reset for all
        RSTA OFFSET(24) NUMBITS(1) [],
        /// Software reset for CMD line
        RSTC OFFSET(25) NUMBITS(1) [],
        /// Software reset for DAT line
        RSTD OFFSET(26) NUMBITS(1) [],
        /// Initialization active (80 clocks)
        INITA OFFSET(27) NUMBITS(1) []
    ],

    /// Host Controller Capabilities Register (0x40)
    pub HOST_CTRL_CAP [
        /// Max block length (512 << MBL bytes)
        MBL OFFSET(16) NUMBITS(2) [],
        /// ADMA support
        ADMAS OFFSET(20) NUMBITS(1) [],
        /// High speed support
        HSS OFFSET(21) NUMBITS(1) [],
        /// DMA support
        DMAS OFFSET(22) NUMBITS(1) [],
        /// Suspend/resume support
        SRS OFFSET(23) NUMBITS(1) [],
        /// Voltage support 3.3V
        VS33 OFFSET(24) NUMBITS(1) [],
        /// Voltage support 3.0V
        VS30 OFFSET(25) NUMBITS(1) [],
        /// Voltage support 1.8V
        VS18 OFFSET(26) NUMBITS(1) []
    ],

    /// Watermark Level Register (0x44)
    pub WTMK_LVL [
        /// Read watermark level (words)
        RD_WML OFFSET(0) NUMBITS(8) [],
        /// Write watermark level (words)
        WR_WML OFFSET(16) NUMBITS(8) []
    ],

    /// Mixer Control Register (0x48)
    pub MIX_CTRL [
        /// DMA enable
        DMAEN OFFSET(0) NUMBITS(1) [],
        /// Block count enable
        BCEN OFFSET(1) NUMBITS(1) [],
        /// Auto CMD12 enable
        AC12EN OFFSET(2) NUMBITS(1) [],
        /// Dual data rate mode
        DDR_EN OFFSET(3) NUMBITS(1) [],
        /// Data transfer direction (1 = card to host)
        DTDSEL OFFSET(4) NUMBITS(1) [],
        /// Multi/single block select
        MSBSEL OFFSET(5) NUMBITS(1) []
    ],

    /// Host Controller Version Register (0xFC)
    pub HOST_VERSION [
        /// Specification version number (0 = v1)
        SVN OFFSET(16) NUMBITS(8) [],
        /// Vendor version number
        VVN OFFSET(24) NUMBITS(8) []
    ]
];

/// Mixer bits that may ride in the low half of CMD_XFR_TYP
pub const MIX_CTRL_XFR_MASK: u32 = 0x3F;

/// Largest watermark level the FIFO accepts (words)
pub const WTMK_LVL_MAX: u32 = 0x80;

/// Data timeout counter programmed for each data command
pub const DATA_TIMEOUT_DTOCV: u32 = 0xE;

// ============================================================================
// Interrupt Status / Enable / Signal Bits
// ============================================================================

bitflags! {
    /// Interrupt status bits (shared by status, status-enable and signal-enable)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntStatus: u32 {
        /// Command complete
        const CC = 1 << 0;
        /// Transfer complete
        const TC = 1 << 1;
        /// Block gap event
        const BGE = 1 << 2;
        /// DMA interrupt
        const DINT = 1 << 3;
        /// Buffer write ready
        const BWR = 1 << 4;
        /// Buffer read ready
        const BRR = 1 << 5;
        /// Card insertion
        const CINS = 1 << 6;
        /// Card removal
        const CRM = 1 << 7;
        /// Card interrupt
        const CINT = 1 << 8;
        /// Re-tuning event
        const RTE = 1 << 12;
        /// Tuning pass
        const TP = 1 << 14;
        /// Generic error summary
        const ERR = 1 << 15;
        /// Command timeout error
        const CTOE = 1 << 16;
        /// Command CRC error
        const CCE = 1 << 17;
        /// Command end bit error
        const CEBE = 1 << 18;
        /// Command index error
        const CIE = 1 << 19;
        /// Data timeout error
        const DTOE = 1 << 20;
        /// Data CRC error
        const DCE = 1 << 21;
        /// Data end bit error
        const DEBE = 1 << 22;
        /// Current limit (overcurrent) error
        const OVRCURE = 1 << 23;
        /// Auto CMD12 error
        const AC12E = 1 << 24;
        /// ADMA error
        const ADMAE = 1 << 25;
        /// Tuning error
        const TNE = 1 << 26;
        /// DMA error
        const DMAE = 1 << 28;
    }
}

impl IntStatus {
    /// Error and card events enabled at all times
    pub const AMBIENT: Self = Self::ADMAE
        .union(Self::OVRCURE)
        .union(Self::DEBE)
        .union(Self::DCE)
        .union(Self::DTOE)
        .union(Self::CRM)
        .union(Self::CINS)
        .union(Self::CIE)
        .union(Self::CEBE)
        .union(Self::CCE)
        .union(Self::CTOE);

    /// Completion events
    pub const COMPLETION: Self = Self::TC.union(Self::CC);

    /// Programmed I/O buffer events
    pub const BUFFER_READY: Self = Self::BRR.union(Self::BWR);

    /// Every bit that signals a failure
    pub const ERRORS: Self = Self::ERR
        .union(Self::CTOE)
        .union(Self::CCE)
        .union(Self::CEBE)
        .union(Self::CIE)
        .union(Self::DTOE)
        .union(Self::DCE)
        .union(Self::DEBE)
        .union(Self::OVRCURE)
        .union(Self::AC12E)
        .union(Self::ADMAE)
        .union(Self::TNE)
        .union(Self::DMAE);
}

// ============================================================================
// Register Block
// ============================================================================

/// Typed view of a controller's register window
#[derive(Debug)]
pub struct SdhcRegs<R> {
    io: R,
}

impl<R: RegisterIo> SdhcRegs<R> {
    pub const fn new(io: R) -> Self {
        Self { io }
    }

    #[inline]
    pub fn read(&self, offset: usize) -> u32 {
        self.io.read32(offset)
    }

    #[inline]
    pub fn write(&self, offset: usize, value: u32) {
        self.io.write32(offset, value)
    }

    /// Snapshot a register as a bitfield copy
    pub fn local<T: RegisterLongName>(&self, offset: usize) -> LocalRegisterCopy<u32, T> {
        LocalRegisterCopy::new(self.read(offset))
    }

    /// Read-modify-write a register through a field value
    pub fn modify<T: RegisterLongName>(&self, offset: usize, field: FieldValue<u32, T>) {
        let mut reg: LocalRegisterCopy<u32, T> = self.local(offset);
        reg.modify(field);
        self.write(offset, reg.get());
    }

    pub fn sys_ctrl(&self) -> LocalRegisterCopy<u32, SYS_CTRL::Register> {
        self.local(SYS_CTRL)
    }

    pub fn present_state(&self) -> LocalRegisterCopy<u32, PRES_STATE::Register> {
        self.local(PRES_STATE)
    }

    pub fn capabilities(&self) -> LocalRegisterCopy<u32, HOST_CTRL_CAP::Register> {
        self.local(HOST_CTRL_CAP)
    }

    pub fn mix_ctrl(&self) -> LocalRegisterCopy<u32, MIX_CTRL::Register> {
        self.local(MIX_CTRL)
    }

    /// Raw specification version field (0 = v1)
    pub fn raw_version(&self) -> u32 {
        self.local::<HOST_VERSION::Register>(HOST_VERSION)
            .read(HOST_VERSION::SVN)
    }

    pub fn int_status(&self) -> IntStatus {
        IntStatus::from_bits_retain(self.read(INT_STATUS))
    }

    /// Acknowledge status bits (write-one-to-clear)
    pub fn ack_int_status(&self, status: IntStatus) {
        self.write(INT_STATUS, status.bits());
    }

    pub fn set_int_status_enable(&self, mask: IntStatus) {
        self.write(INT_STATUS_EN, mask.bits());
    }

    pub fn set_int_signal_enable(&self, mask: IntStatus) {
        self.write(INT_SIGNAL_EN, mask.bits());
    }

    /// Command or data lines still held by a previous command
    pub fn lines_busy(&self) -> bool {
        let state = self.present_state();
        state.is_set(PRES_STATE::CIHB) || state.is_set(PRES_STATE::CDIHB)
    }

    pub fn data_line_active(&self) -> bool {
        self.present_state().is_set(PRES_STATE::DLA)
    }
}
