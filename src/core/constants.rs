// Format and engine constants

// Raw record header: type(u8) dt_us(u32) t0(u32) meta_size(u24) data_size(u32), big-endian
pub const RAW_HEADER_SIZE: usize = 16;

// Record type codes
pub const TYPE_SYNC: u8 = 0;
pub const TYPE_KS: u8 = 1;
pub const TYPE_SYNC_INTEGRAL: u8 = 2;
pub const TYPE_SYNC_FULL_INT: u8 = 3;
pub const TYPE_KS_FLOAT: u8 = 4;

// Every stream value is a 32-bit word
pub const SAMPLE_SIZE: usize = 4;

// Amplitude and runtime share one word
pub const AMPLITUDE_MASK: u32 = 0x0FFF;
pub const RUNTIME_SHIFT: u32 = 12;
pub const RUNTIME_COARSE_BIT: u32 = 0x2_0000;

pub const REDUCTION_STEPS: [usize; 13] = [
    1, 10, 50, 100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000, 10_000_000,
];

// A gap wider than this many representative intervals starts a new segment
pub const GAP_FACTOR: f64 = 10.0;

// Requested reduction at which envelopes switch from min/max to mean ± std
pub const STD_ENVELOPE_THRESHOLD: usize = 100;

// Buckets with fewer samples are degenerate (min = max = mean = first)
pub const MIN_STAT_SAMPLES: usize = 3;

pub const DATE_FORMATS: [&str; 2] = ["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

// Longer parenthesised header suffixes are notes, not units
pub const MAX_UNIT_LEN: usize = 5;

// Device clocks run one hour behind the time axis
pub const RAW_CLOCK_OFFSET_SECS: i64 = 3600;

pub const CSV_EXTENSION: &str = "csv";
pub const RAW_EXTENSION: &str = "bin";
