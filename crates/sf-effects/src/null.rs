//! Null effect: consumes its input and contributes nothing.

use crate::{DeviceInfo, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;

/// Placeholder kernel for slots with no effect loaded.
#[derive(Debug, Default)]
pub struct NullEffect;

impl EffectProcessor for NullEffect {
    fn device_update(&mut self, _device: &DeviceInfo) {}

    fn update(&mut self, _props: &EffectProps) {}

    fn process(
        &mut self,
        _frames: usize,
        _input: &[FloatBufferLine],
        _output: &mut [FloatBufferLine],
    ) {
    }
}
