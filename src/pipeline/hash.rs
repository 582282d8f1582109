//! Manual `Hash` and `Eq` implementations for pipeline state holding floats. Floats are compared and hashed by bit
//! pattern, so `-0.0` and `0.0` are different keys and `NaN` equals itself.

use std::hash::{Hash, Hasher};

use crate::pipeline::create_info::{DepthBias, DepthStencilState, MultisampleState, RasterizationState};

fn float_bits(value: f32) -> u32 {
    value.to_bits()
}

fn option_bits(value: Option<f32>) -> Option<u32> {
    value.map(float_bits)
}

impl Hash for DepthBias {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        float_bits(self.constant_factor).hash(hasher);
        float_bits(self.clamp).hash(hasher);
        float_bits(self.slope_factor).hash(hasher);
    }
}

impl PartialEq for DepthBias {
    fn eq(&self, other: &Self) -> bool {
        float_bits(self.constant_factor) == float_bits(other.constant_factor)
            && float_bits(self.clamp) == float_bits(other.clamp)
            && float_bits(self.slope_factor) == float_bits(other.slope_factor)
    }
}

impl Eq for DepthBias {}

impl Hash for RasterizationState {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.polygon_mode.hash(hasher);
        self.cull_mode.hash(hasher);
        self.front_face.hash(hasher);
        self.depth_clamp.hash(hasher);
        self.depth_bias.hash(hasher);
        float_bits(self.line_width).hash(hasher);
    }
}

impl PartialEq for RasterizationState {
    fn eq(&self, other: &Self) -> bool {
        self.polygon_mode == other.polygon_mode
            && self.cull_mode == other.cull_mode
            && self.front_face == other.front_face
            && self.depth_clamp == other.depth_clamp
            && self.depth_bias == other.depth_bias
            && float_bits(self.line_width) == float_bits(other.line_width)
    }
}

impl Eq for RasterizationState {}

impl Hash for DepthStencilState {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.depth_test.hash(hasher);
        self.depth_write.hash(hasher);
        self.compare_op.hash(hasher);
        self.stencil.hash(hasher);
        self.depth_bounds
            .map(|(min, max)| (float_bits(min), float_bits(max)))
            .hash(hasher);
    }
}

impl PartialEq for DepthStencilState {
    fn eq(&self, other: &Self) -> bool {
        let bounds = |state: &Self| state.depth_bounds.map(|(min, max)| (float_bits(min), float_bits(max)));
        self.depth_test == other.depth_test
            && self.depth_write == other.depth_write
            && self.compare_op == other.compare_op
            && self.stencil == other.stencil
            && bounds(self) == bounds(other)
    }
}

impl Eq for DepthStencilState {}

impl Hash for MultisampleState {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.samples.hash(hasher);
        option_bits(self.sample_shading).hash(hasher);
        self.alpha_to_coverage.hash(hasher);
        self.alpha_to_one.hash(hasher);
    }
}

impl PartialEq for MultisampleState {
    fn eq(&self, other: &Self) -> bool {
        self.samples == other.samples
            && option_bits(self.sample_shading) == option_bits(other.sample_shading)
            && self.alpha_to_coverage == other.alpha_to_coverage
            && self.alpha_to_one == other.alpha_to_one
    }
}

impl Eq for MultisampleState {}

#[cfg(test)]
mod tests {
    use crate::util::cache::hash_key;

    use super::*;

    #[test]
    fn equal_states_hash_equal() {
        let a = RasterizationState {
            line_width: 2.0,
            ..Default::default()
        };
        let b = a;
        assert_eq!(a, b);
        assert_eq!(hash_key(&a), hash_key(&b));
    }

    #[test]
    fn float_fields_take_part_in_the_key() {
        let a = MultisampleState::default();
        let b = MultisampleState {
            sample_shading: Some(0.5),
            ..Default::default()
        };
        assert_ne!(a, b);
        assert_ne!(hash_key(&a), hash_key(&b));
    }
}
