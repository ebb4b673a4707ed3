//! Main crate of the rumble N64 emulator. This crate is responsible for implementing the emulation
//! of the N64, providing all of the functionality but no "frontend" code such as a GUI or a CLI.
//!
//! It does not draw, play audio or run RSP microcode by itself: those jobs are handed to the
//! collaborators in [`plugin`].

mod boot;
mod bus;
pub mod cart;
pub mod cpu;
mod exception;
mod interrupt;
pub mod pacer;
pub mod plugin;
mod rcp;
pub mod scheduler;
mod si;
mod translate;

use cart::{Cart, SaveStorage};
use easyerr::{Error, ResultExt};
use pacer::Pacer;
use plugin::{PluginKind, PluginSet, Plugins};
use rumble_core::{
    Count,
    cpu::{Cpu, cop0, cop1::Cop1, tlb::Tlb},
    mem::{Memory, RDRAM_BASE_LEN, RDRAM_LEN, RegionMap},
    pif::Pif,
    rcp::Rcp,
    rom::{
        Rom, RomError,
        database::{Database, Entry, Patch, SaveType},
    },
};
use scheduler::Scheduler;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
    },
};
use strum::{FromRepr, IntoStaticStr};
use tracing::info;

pub use rumble_core as core;

/// Emulator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// COUNT increment per retired instruction. Overridden by the database entry of the title.
    pub count_per_op: u32,
    /// Whether SI DMAs complete after a delay instead of instantly.
    pub delay_si: bool,
    /// Report 4MiB of RDRAM to the boot code instead of 8MiB.
    pub disable_extra_mem: bool,
    /// COUNT units per VI line.
    pub vi_refresh: u32,
    /// Whether the pacer limits emulation to the refresh rate of the video standard.
    pub limit_fps: bool,
    /// Directory of the save files. Saves are kept in memory if `None`.
    pub save_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count_per_op: 2,
            delay_si: true,
            disable_extra_mem: false,
            vi_refresh: 1500,
            limit_fps: true,
            save_dir: None,
        }
    }
}

/// Lifecycle state of an [`Emulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum State {
    Idle,
    RomLoaded,
    HardwareInitialized,
    Running,
    Stopped,
}

/// State shared between the emulation thread and whoever controls it.
#[derive(Debug)]
pub struct Shared {
    stop: AtomicBool,
    reset: AtomicBool,
    limit_fps: AtomicBool,
    /// Bits of an `f32`.
    fps: AtomicU32,
    state: AtomicU8,
}

impl Default for Shared {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Shared {
    pub fn new(limit_fps: bool) -> Self {
        Self {
            stop: AtomicBool::new(false),
            reset: AtomicBool::new(false),
            limit_fps: AtomicBool::new(limit_fps),
            fps: AtomicU32::new(0),
            state: AtomicU8::new(State::Idle as u8),
        }
    }

    /// Asks the emulation loop to stop. Observed before the next instruction is fetched.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Presses the reset button. Observed on the next VI.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::Relaxed);
    }

    fn take_reset(&self) -> bool {
        self.reset.swap(false, Ordering::Relaxed)
    }

    pub fn set_limit_fps(&self, limit: bool) {
        self.limit_fps.store(limit, Ordering::Relaxed);
    }

    pub fn limit_fps(&self) -> bool {
        self.limit_fps.load(Ordering::Relaxed)
    }

    /// VIs per second, as last measured by the pacer.
    pub fn fps(&self) -> f32 {
        f32::from_bits(self.fps.load(Ordering::Relaxed))
    }

    fn set_fps(&self, fps: f32) {
        self.fps.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub fn state(&self) -> State {
        State::from_repr(self.state.load(Ordering::Acquire)).unwrap_or(State::Idle)
    }

    fn set_state(&self, state: State) {
        info!("emulator state: {}", <&'static str>::from(state));
        self.state.store(state as u8, Ordering::Release);
    }
}

/// The state of the N64. The [`Emulator`] and it's systems operate on this struct.
pub struct Machine {
    pub config: Config,
    pub shared: Arc<Shared>,

    pub cpu: Cpu,
    pub cop0: cop0::Registers,
    pub cop1: Cop1,
    pub tlb: Tlb,
    pub memory: Memory,
    pub regions: RegionMap,
    pub rcp: Rcp,
    pub pif: Pif,
    pub rom: Rom,
    pub cart: Cart,
    /// The event scheduler.
    pub scheduler: Scheduler,
    pub plugins: Plugins,
    pub pacer: Pacer,

    /// Patches of the title.
    pub patches: Vec<Patch>,
    /// COUNT increment per retired instruction.
    pub count_per_op: u32,
    /// ROM base of the GoldenEye TLB window, if the title is GoldenEye.
    pub goldeneye_base: Option<u32>,
    /// VIs since the last reset.
    pub frames: u32,
    /// Whether a graphics task waits for the RDP to unfreeze.
    pub rsp_task_locked: bool,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("regs", &self.cpu.regs)
            .field("rom", &self.rom)
            .field("scheduler", &self.scheduler)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Builds a machine in its power-off state. [`Machine::hard_reset`] and
    /// [`Machine::soft_reset`] bring it up.
    pub fn new(
        config: Config,
        rom: Rom,
        entry: Option<&Entry>,
        plugins: Plugins,
        shared: Arc<Shared>,
    ) -> Self {
        let name = rom.header.name();
        let count_per_op = entry
            .map(|e| e.count_per_op)
            .filter(|&c| c != 0)
            .unwrap_or(config.count_per_op);
        let save_type = entry.map_or(SaveType::Auto, |e| e.save_type);

        let storage = match &config.save_dir {
            Some(dir) => SaveStorage::Directory {
                dir: dir.clone(),
                name: name.clone(),
            },
            None => SaveStorage::Memory,
        };

        let rdram_len = if config.disable_extra_mem {
            RDRAM_BASE_LEN
        } else {
            RDRAM_LEN
        };

        let goldeneye_base = translate::goldeneye_base(&rom.header);
        let pacer = Pacer::new(rom.standard.refresh_rate());

        info!(
            target: "rom",
            "loaded {name:?}: {} bytes, {}, {}, save type {}, {count_per_op} COUNT per instruction",
            rom.len(),
            <&'static str>::from(rom.cic),
            <&'static str>::from(rom.standard),
            <&'static str>::from(save_type),
        );

        Self {
            regions: RegionMap::new(rom.len(), rdram_len),
            cart: Cart::new(save_type, &storage),
            patches: entry.map(|e| e.patches.clone()).unwrap_or_default(),

            cpu: Cpu::default(),
            cop0: cop0::Registers::default(),
            cop1: Cop1::default(),
            tlb: Tlb::default(),
            memory: Memory::default(),
            rcp: Rcp::default(),
            pif: Pif::default(),
            scheduler: Scheduler::new(),

            config,
            shared,
            rom,
            plugins,
            pacer,
            count_per_op,
            goldeneye_base,
            frames: 0,
            rsp_task_locked: false,
        }
    }

    /// Whether emulation should stop.
    #[inline(always)]
    pub fn stopped(&self) -> bool {
        self.shared.stop_requested()
    }

    /// Stops emulation. Used for fatal conditions.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    #[inline(always)]
    pub fn count(&self) -> Count {
        self.cop0.count()
    }
}

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("no {kind:?} collaborator was provided")]
    MissingPlugin { kind: PluginKind },
    #[error("the {expected:?} collaborator reports kind {found}")]
    PluginKind { expected: PluginKind, found: u16 },
    #[error("the {kind:?} collaborator implements interface version 0x{version:04X}")]
    PluginVersion { kind: PluginKind, version: u16 },
    #[error("couldn't read ROM file {path:?}")]
    RomRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid ROM image")]
    Rom { source: RomError },
}

/// Checks that a collaborator is present and describes itself as the expected kind.
fn validate<T: plugin::Plugin + ?Sized>(
    plugin: Option<Box<T>>,
    expected: PluginKind,
) -> Result<Box<T>, EmulatorError> {
    let plugin = plugin.ok_or(EmulatorError::MissingPlugin { kind: expected })?;
    let info = plugin.info();

    if info.kind() != Some(expected) {
        return Err(EmulatorError::PluginKind {
            expected,
            found: info.kind,
        });
    }

    if info.version >> 8 != plugin::INTERFACE_VERSION >> 8 {
        return Err(EmulatorError::PluginVersion {
            kind: expected,
            version: info.version,
        });
    }

    info!("using {} collaborator {:?}", <&'static str>::from(expected), info.name());
    Ok(plugin)
}

/// The rumble emulator.
pub struct Emulator {
    /// The state of the system.
    machine: Machine,
}

impl Emulator {
    /// Creates a new [`Emulator`] for the given ROM, validating the collaborators.
    pub fn new(
        config: Config,
        rom: Rom,
        entry: Option<&Entry>,
        plugins: PluginSet,
        shared: Arc<Shared>,
    ) -> Result<Self, EmulatorError> {
        let mut plugins = Plugins {
            display: validate(plugins.display, PluginKind::Display)?,
            audio: validate(plugins.audio, PluginKind::Audio)?,
            input: validate(plugins.input, PluginKind::Input)?,
            rsp: validate(plugins.rsp, PluginKind::Rsp)?,
        };

        plugins.rom_open(&rom.header);

        let machine = Machine::new(config, rom, entry, plugins, shared);
        machine.shared.set_state(State::RomLoaded);

        Ok(Self { machine })
    }

    /// Reads and parses the ROM at `path`, looks it up in the database and creates a new
    /// [`Emulator`] for it.
    pub fn open(
        config: Config,
        path: &Path,
        database: Option<&Database>,
        plugins: PluginSet,
        shared: Arc<Shared>,
    ) -> Result<Self, EmulatorError> {
        let data = std::fs::read(path).context(EmulatorCtx::RomRead {
            path: path.to_owned(),
        })?;
        let rom = Rom::new(data).context(EmulatorCtx::Rom)?;

        let entry = database.and_then(|db| db.lookup(rom.header.crc1, rom.header.crc2));
        if let Some(entry) = entry {
            info!(target: "rom", "found database entry {:?}", entry.name);
        }

        Self::new(config, rom, entry, plugins, shared)
    }

    /// Brings the machine up: hard reset, soft reset and scheduler initialization.
    pub fn initialize(&mut self) {
        let machine = &mut self.machine;
        machine.hard_reset();
        machine.soft_reset();

        let count = machine.count();
        machine.scheduler.initialize(count);
        machine.shared.set_state(State::HardwareInitialized);
    }

    /// Runs the machine until a stop is requested. Initializes it first if needed.
    pub fn run(&mut self) {
        if self.machine.shared.state() == State::RomLoaded {
            self.initialize();
        }

        self.machine.shared.set_state(State::Running);
        cpu::Interpreter::new(&mut self.machine).run();

        self.machine.plugins.rom_closed();
        self.machine.shared.set_state(State::Stopped);
    }

    /// Returns a reference to the state of the system.
    #[inline(always)]
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Returns a mutable reference to the state of the system.
    #[inline(always)]
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.machine.shared
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::plugin::{NullAudio, NullDisplay, Plugin};

    pub(crate) fn rom_image(name: &str, country: u8) -> Vec<u8> {
        let mut data = vec![0u8; 0x10_0000];
        data[..4].copy_from_slice(&[0x80, 0x37, 0x12, 0x40]);
        data[0x08..0x0C].copy_from_slice(&0x8000_0400u32.to_be_bytes());
        let name = name.as_bytes();
        data[0x20..0x20 + name.len()].copy_from_slice(name);
        data[0x3E] = country;
        data
    }

    #[test]
    fn missing_plugin_is_reported() {
        let rom = Rom::new(rom_image("TEST", b'E')).unwrap();
        let mut plugins = PluginSet::null();
        plugins.rsp = None;

        let result = Emulator::new(Config::default(), rom, None, plugins, Arc::default());
        assert!(matches!(
            result,
            Err(EmulatorError::MissingPlugin {
                kind: PluginKind::Rsp
            })
        ));
    }

    #[test]
    fn wrong_plugin_kind_is_reported() {
        struct Impostor;

        impl Plugin for Impostor {
            fn info(&self) -> plugin::PluginInfo {
                NullAudio.info()
            }
        }

        impl plugin::Display for Impostor {
            fn update_screen(&mut self, _: &Memory, _: &rumble_core::rcp::vi::Vi) {}
            fn process_rdp_list(&mut self, _: &Memory, _: &rumble_core::rcp::dp::Dpc) {}
        }

        let rom = Rom::new(rom_image("TEST", b'E')).unwrap();
        let mut plugins = PluginSet::null();
        plugins.display = Some(Box::new(Impostor));

        let result = Emulator::new(Config::default(), rom, None, plugins, Arc::default());
        assert!(matches!(
            result,
            Err(EmulatorError::PluginKind {
                expected: PluginKind::Display,
                found: 3
            })
        ));

        // the real one passes
        let rom = Rom::new(rom_image("TEST", b'E')).unwrap();
        let mut plugins = PluginSet::null();
        plugins.display = Some(Box::new(NullDisplay));
        assert!(Emulator::new(Config::default(), rom, None, plugins, Arc::default()).is_ok());
    }

    #[test]
    fn lifecycle() {
        let rom = Rom::new(rom_image("TEST", b'E')).unwrap();
        let shared = Arc::new(Shared::new(false));
        let mut emulator =
            Emulator::new(Config::default(), rom, None, PluginSet::null(), shared.clone()).unwrap();
        assert_eq!(shared.state(), State::RomLoaded);

        emulator.initialize();
        assert_eq!(shared.state(), State::HardwareInitialized);

        shared.request_stop();
        emulator.run();
        assert_eq!(shared.state(), State::Stopped);
    }

    #[test]
    fn database_overrides_timing() {
        let rom = Rom::new(rom_image("TEST", b'E')).unwrap();
        let entry = Entry {
            crc1: 0,
            crc2: 0,
            name: "TEST".to_owned(),
            count_per_op: 1,
            save_type: SaveType::Sram,
            patches: Vec::new(),
        };

        let machine = Machine::new(
            Config::default(),
            rom,
            Some(&entry),
            Plugins::null(),
            Arc::default(),
        );
        assert_eq!(machine.count_per_op, 1);
        assert_eq!(machine.cart.domain2, cart::Domain2::Sram);
    }
}
