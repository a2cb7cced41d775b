use crate::util::Interval;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// The body style of a vehicle, which bounds its size and top speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VehicleModel {
    Compact,
    Sedan,
    Suv,
    Van,
}

/// The ranges a model's attributes are drawn from.
#[derive(Clone, Copy, Debug)]
pub struct ModelRanges {
    /// Length along the direction of travel.
    pub length: Interval<f64>,
    /// Width across the direction of travel.
    pub width: Interval<f64>,
    pub max_speed: Interval<f64>,
}

impl VehicleModel {
    pub const ALL: [VehicleModel; 4] = [
        VehicleModel::Compact,
        VehicleModel::Sedan,
        VehicleModel::Suv,
        VehicleModel::Van,
    ];

    pub fn ranges(self) -> ModelRanges {
        let (length, width, max_speed) = match self {
            VehicleModel::Compact => ((28.0, 32.0), (15.0, 17.0), (115.0, 125.0)),
            VehicleModel::Sedan => ((34.0, 38.0), (17.0, 19.0), (105.0, 115.0)),
            VehicleModel::Suv => ((38.0, 42.0), (19.0, 21.0), (95.0, 105.0)),
            VehicleModel::Van => ((42.0, 48.0), (20.0, 22.0), (85.0, 95.0)),
        };
        let interval = |(min, max)| Interval::new(min, max);
        ModelRanges {
            length: interval(length),
            width: interval(width),
            max_speed: interval(max_speed),
        }
    }
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug)]
pub struct VehicleAttributes {
    pub model: VehicleModel,
    /// The vehicle length in world units.
    pub length: f64,
    /// The vehicle width in world units.
    pub width: f64,
    /// The top speed in world units per second.
    pub max_speed: f64,
    /// An index into the renderer's colour palette.
    pub color: usize,
}

impl VehicleAttributes {
    /// Draws the attributes of a random vehicle of a random model.
    pub fn random(rng: &mut impl Rng, palette_size: usize) -> Self {
        let model = *VehicleModel::ALL.choose(rng).unwrap_or(&VehicleModel::Sedan);
        Self::random_of(model, rng, palette_size)
    }

    /// Draws the attributes of a random vehicle of the given model.
    pub fn random_of(model: VehicleModel, rng: &mut impl Rng, palette_size: usize) -> Self {
        let ranges = model.ranges();
        Self {
            model,
            length: draw(ranges.length, rng),
            width: draw(ranges.width, rng),
            max_speed: draw(ranges.max_speed, rng),
            color: rng.gen_range(0..palette_size.max(1)),
        }
    }

    /// The attributes of a typical sedan, the midpoint of its ranges.
    pub fn sedan() -> Self {
        Self {
            model: VehicleModel::Sedan,
            length: 36.0,
            width: 18.0,
            max_speed: 110.0,
            color: 0,
        }
    }
}

fn draw(range: Interval<f64>, rng: &mut impl Rng) -> f64 {
    Uniform::new_inclusive(range.min, range.max).sample(rng)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn attributes_within_ranges() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let attrs = VehicleAttributes::random(&mut rng, 5);
            let ranges = attrs.model.ranges();
            assert!(ranges.length.contains(attrs.length));
            assert!(ranges.width.contains(attrs.width));
            assert!(ranges.max_speed.contains(attrs.max_speed));
            assert!(attrs.color < 5);
        }
    }

    #[test]
    fn bigger_models_are_longer() {
        let lengths = VehicleModel::ALL.map(|m| m.ranges().length);
        for pair in lengths.windows(2) {
            assert!(pair[0].max <= pair[1].min);
        }
    }
}
