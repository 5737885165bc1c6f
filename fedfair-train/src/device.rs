//! Compute-device placement
//!
//! A model is owned by exactly one client or evaluator at a time. Whoever
//! holds it moves it onto its device for the duration of a pass through a
//! [`DeviceScope`]; dropping the scope puts the model back on the host in
//! inference mode, whether the pass finished or returned early with an error.

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::model::Model;

/// Where model computation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    /// Host CPU (default, always available)
    #[default]
    Cpu,
    /// Accelerator by ordinal
    Accelerator(u32),
}

impl Device {
    /// Returns true for the host device
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(id) => write!(f, "accel:{id}"),
        }
    }
}

/// Scoped device residency for a borrowed model.
///
/// Derefs to the model, so the pass uses the scope exactly like the model.
pub struct DeviceScope<'a, M: Model + ?Sized> {
    model: &'a mut M,
}

impl<'a, M: Model + ?Sized> DeviceScope<'a, M> {
    /// Moves `model` to `device` and sets its training mode.
    pub fn acquire(model: &'a mut M, device: Device, training: bool) -> Self {
        trace!(%device, training, "acquiring device residency");
        model.to_device(device);
        model.set_training(training);
        Self { model }
    }
}

impl<M: Model + ?Sized> Deref for DeviceScope<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model
    }
}

impl<M: Model + ?Sized> DerefMut for DeviceScope<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.model
    }
}

impl<M: Model + ?Sized> Drop for DeviceScope<'_, M> {
    fn drop(&mut self) {
        self.model.set_training(false);
        self.model.to_device(Device::Cpu);
        trace!("released device residency");
    }
}
