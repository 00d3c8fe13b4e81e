use rand::Rng;
use shared::Point;

// Server timeline: wall-clock seconds, same epoch clients report in
pub fn now_secs() -> f64 {
    shared::timestamp_secs()
}

// Round a value to the given number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// Random position inside the 10%..90% band of the container
pub fn random_position<R: Rng + ?Sized>(rng: &mut R) -> Point {
    Point {
        x: rng.gen_range(0.1..0.9),
        y: rng.gen_range(0.1..0.9),
    }
}
