//! Collaborators of the emulator: display, audio, input and RSP implementations.
//!
//! Every collaborator describes itself through a [`PluginInfo`], which is checked when the
//! emulator is built. The layout of [`PluginInfo`] is fixed so foreign implementations can fill it.

use bitos::bitos;
use rumble_core::{
    mem::Memory,
    rcp::{Rcp, dp::Dpc, vi::Vi},
    rom::{Header, VideoStandard},
};
use strum::{FromRepr, IntoStaticStr};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Version of the plugin interface.
pub const INTERFACE_VERSION: u16 = 0x0103;

/// Kind of a collaborator, as stored in [`PluginInfo::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u16)]
pub enum PluginKind {
    Rsp = 1,
    Display = 2,
    Audio = 3,
    Input = 4,
}

/// Self description of a collaborator.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct PluginInfo {
    pub version: u16,
    /// A [`PluginKind`].
    pub kind: u16,
    /// NUL terminated name.
    pub name: [u8; 100],
    /// Whether the collaborator accesses memory in the machine's own byte order.
    pub normal_memory: i32,
    /// Whether the collaborator expects memory with every word byteswapped.
    pub memory_byte_swapped: i32,
}

impl PluginInfo {
    pub fn new(kind: PluginKind, name: &str) -> Self {
        let mut buf = [0u8; 100];
        let len = name.len().min(buf.len() - 1);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);

        Self {
            version: INTERFACE_VERSION,
            kind: kind as u16,
            name: buf,
            normal_memory: 1,
            memory_byte_swapped: 0,
        }
    }

    /// Reads an info block filled by a foreign implementation.
    pub fn from_raw(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes).ok()
    }

    pub fn kind(&self) -> Option<PluginKind> {
        PluginKind::from_repr(self.kind)
    }

    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Functionality shared by every collaborator.
pub trait Plugin: Send {
    fn info(&self) -> PluginInfo;

    /// A ROM was opened.
    fn rom_open(&mut self, _header: &Header) {}

    /// The ROM was closed.
    fn rom_closed(&mut self) {}
}

/// Draws frames and executes RDP command lists.
pub trait Display: Plugin {
    /// Presents a frame. Called on every VI.
    fn update_screen(&mut self, memory: &Memory, vi: &Vi);

    /// Executes the RDP commands between the start and end registers.
    fn process_rdp_list(&mut self, memory: &Memory, dpc: &Dpc);

    fn vi_status_changed(&mut self, _status: u32) {}

    fn vi_width_changed(&mut self, _width: u32) {}
}

/// Plays audio buffers.
pub trait Audio: Plugin {
    /// The DAC rate register changed.
    fn dacrate_changed(&mut self, standard: VideoStandard, dacrate: u32);

    /// A new buffer of samples was handed to the AI.
    fn length_changed(&mut self, samples: &[u8]);
}

/// A controller plugged into the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controller {
    pub present: bool,
    /// Whether an accessory is plugged into the controller.
    pub pak: bool,
}

/// Button state of a controller, in the layout of the controller read command response.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons {
    #[bits(0..8)]
    pub stick_y: u8,
    #[bits(8..16)]
    pub stick_x: u8,
    #[bits(16)]
    pub c_right: bool,
    #[bits(17)]
    pub c_left: bool,
    #[bits(18)]
    pub c_down: bool,
    #[bits(19)]
    pub c_up: bool,
    #[bits(20)]
    pub r: bool,
    #[bits(21)]
    pub l: bool,
    #[bits(23)]
    pub reset: bool,
    #[bits(24)]
    pub d_right: bool,
    #[bits(25)]
    pub d_left: bool,
    #[bits(26)]
    pub d_down: bool,
    #[bits(27)]
    pub d_up: bool,
    #[bits(28)]
    pub start: bool,
    #[bits(29)]
    pub z: bool,
    #[bits(30)]
    pub b: bool,
    #[bits(31)]
    pub a: bool,
}

/// Provides controller state.
pub trait Input: Plugin {
    fn controllers(&self) -> [Controller; 4];

    /// Reads the buttons of the controller on `channel`.
    fn buttons(&mut self, channel: usize) -> Buttons;
}

/// Type of the task found in DMEM when the RSP starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Task {
    Graphics,
    Audio,
    Other,
}

impl Task {
    /// Offset of the task type in DMEM.
    pub const TYPE_OFFSET: u32 = 0xFC0;

    pub fn from_type(value: u32) -> Self {
        match value {
            1 => Self::Graphics,
            2 => Self::Audio,
            _ => Self::Other,
        }
    }
}

/// Interrupts an RSP task raised while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskSignals {
    pub sp_interrupt: bool,
    pub dp_interrupt: bool,
}

/// Runs RSP tasks.
pub trait Rsp: Plugin {
    fn run(&mut self, task: Task, memory: &mut Memory, rcp: &mut Rcp) -> TaskSignals;
}

/// The collaborators of the emulator, as handed over at construction time. A missing one is
/// reported when building the emulator.
#[derive(Default)]
pub struct PluginSet {
    pub display: Option<Box<dyn Display>>,
    pub audio: Option<Box<dyn Audio>>,
    pub input: Option<Box<dyn Input>>,
    pub rsp: Option<Box<dyn Rsp>>,
}

impl PluginSet {
    /// A set made of the null collaborators.
    pub fn null() -> Self {
        Self {
            display: Some(Box::new(NullDisplay)),
            audio: Some(Box::new(NullAudio)),
            input: Some(Box::new(NullInput)),
            rsp: Some(Box::new(NullRsp)),
        }
    }
}

/// The validated collaborators of a machine.
pub struct Plugins {
    pub display: Box<dyn Display>,
    pub audio: Box<dyn Audio>,
    pub input: Box<dyn Input>,
    pub rsp: Box<dyn Rsp>,
}

impl std::fmt::Debug for Plugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugins")
            .field("display", &self.display.info().name())
            .field("audio", &self.audio.info().name())
            .field("input", &self.input.info().name())
            .field("rsp", &self.rsp.info().name())
            .finish()
    }
}

impl Plugins {
    /// The null collaborators.
    pub fn null() -> Self {
        Self {
            display: Box::new(NullDisplay),
            audio: Box::new(NullAudio),
            input: Box::new(NullInput),
            rsp: Box::new(NullRsp),
        }
    }

    pub fn rom_open(&mut self, header: &Header) {
        self.display.rom_open(header);
        self.audio.rom_open(header);
        self.input.rom_open(header);
        self.rsp.rom_open(header);
    }

    pub fn rom_closed(&mut self) {
        self.display.rom_closed();
        self.audio.rom_closed();
        self.input.rom_closed();
        self.rsp.rom_closed();
    }
}

/// A display that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl Plugin for NullDisplay {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(PluginKind::Display, "null display")
    }
}

impl Display for NullDisplay {
    fn update_screen(&mut self, _memory: &Memory, _vi: &Vi) {}

    fn process_rdp_list(&mut self, _memory: &Memory, _dpc: &Dpc) {}
}

/// An audio output that drops every buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudio;

impl Plugin for NullAudio {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(PluginKind::Audio, "null audio")
    }
}

impl Audio for NullAudio {
    fn dacrate_changed(&mut self, _standard: VideoStandard, _dacrate: u32) {}

    fn length_changed(&mut self, _samples: &[u8]) {}
}

/// A single controller with no buttons pressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInput;

impl Plugin for NullInput {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(PluginKind::Input, "null input")
    }
}

impl Input for NullInput {
    fn controllers(&self) -> [Controller; 4] {
        let mut controllers = [Controller::default(); 4];
        controllers[0].present = true;
        controllers
    }

    fn buttons(&mut self, _channel: usize) -> Buttons {
        Buttons::default()
    }
}

/// An RSP that completes every task instantly without executing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRsp;

impl Plugin for NullRsp {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(PluginKind::Rsp, "null rsp")
    }
}

impl Rsp for NullRsp {
    fn run(&mut self, task: Task, _memory: &mut Memory, _rcp: &mut Rcp) -> TaskSignals {
        TaskSignals {
            sp_interrupt: true,
            dp_interrupt: task == Task::Graphics,
        }
    }
}
