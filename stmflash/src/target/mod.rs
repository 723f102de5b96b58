//! Target support: family detection, STM8 routines and the protocol engine.

pub mod engine;
pub mod family;
pub mod routines;

pub use engine::{
    Bootloader, ConnectOptions, DEFAULT_ROUTINES_DIR, EngineConfig, EngineState, ProgramSummary,
    RESET_SETTLE,
};
pub use family::{BootloaderInfo, Capabilities, Family, VersionInfo};
pub use routines::{
    DeviceSelection, DirRoutineLoader, FlashSize, ROUTINES_ADDRESS, RoutineLoader, RoutinesState,
    routines_file_name,
};
