/// A PCM sample format the streaming entry points accept.
///
/// Everything is converted to `f32` in `-1.0..=1.0` internally and back on
/// output, clamping out-of-range values.
pub trait Sample: Copy + Send + Sync + 'static {
    const SILENCE: Self;

    fn to_f32(self) -> f32;

    fn from_f32(value: f32) -> Self;
}

impl Sample for f32 {
    const SILENCE: Self = 0.0;

    fn to_f32(self) -> f32 {
        if self.is_nan() {
            0.0
        } else {
            self.clamp(-1.0, 1.0)
        }
    }

    fn from_f32(value: f32) -> Self {
        value.to_f32()
    }
}

impl Sample for i16 {
    const SILENCE: Self = 0;

    fn to_f32(self) -> f32 {
        self as f32 / 32768.0
    }

    fn from_f32(value: f32) -> Self {
        (value.to_f32() * 32767.0).round() as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_clamps() {
        assert_eq!(f32::from_f32(1.5), 1.0);
        assert_eq!(f32::from_f32(-3.0), -1.0);
        assert_eq!(f32::NAN.to_f32(), 0.0);
        assert_eq!(0.25f32.to_f32(), 0.25);
    }

    #[test]
    fn test_i16_scaling() {
        assert_eq!(i16::from_f32(1.0), i16::MAX);
        assert_eq!(i16::from_f32(-1.0), -i16::MAX);
        assert_eq!(i16::from_f32(2.0), i16::MAX);
        assert_eq!(i16::from_f32(0.0), 0);
        assert_eq!(i16::MIN.to_f32(), -1.0);
        assert!((i16::from_f32(0.5).to_f32() - 0.5).abs() < 1e-4);
    }
}
