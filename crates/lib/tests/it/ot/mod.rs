//! Properties of the operation algebra, checked over seeded random operations.

mod sequence_properties;
