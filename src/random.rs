use core::cmp::min;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Uniform};
use std::{
    fs::File,
    io::{self, Read},
};

/// Whether an event with a `percent` chance (0..=100) happens
pub fn chance(rng: &mut (impl RngCore + ?Sized), percent: f64) -> bool {
    if percent <= 0. {
        false
    } else if percent >= 100. {
        true
    } else {
        rng.random::<f64>() * 100. < percent
    }
}

/// A delta whose magnitude lies in `[min, max]` with a random sign.
/// The band `(-min, min)` is never produced.
pub fn signed_magnitude(rng: &mut (impl RngCore + ?Sized), (lo, hi): (f64, f64)) -> f64 {
    let magnitude = if hi > lo {
        rng.random_range(lo..=hi)
    } else {
        lo
    };

    if rng.random_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

/// A value drawn uniformly from `[lo, hi)`, or `lo` when the range is empty
pub fn uniform(rng: &mut (impl RngCore + ?Sized), (lo, hi): (f64, f64)) -> f64 {
    match Uniform::new(lo, hi) {
        Ok(dist) => dist.sample(rng),
        Err(_) => lo,
    }
}

pub struct WyRng {
    state: u64,
}

impl WyRng {
    pub fn seeded(state: u64) -> Self {
        Self { state }
    }
}

impl RngCore for WyRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        const WY_CONST_0: u64 = 0x2d35_8dcc_aa6c_78a5;
        const WY_CONST_1: u64 = 0x8bb8_4b93_962e_acc9;
        self.state = self.state.wrapping_add(WY_CONST_0);
        let t = u128::from(self.state) * u128::from(self.state ^ WY_CONST_1);
        (t as u64) ^ (t >> 64) as u64
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        let mut idx = 0;
        while idx < dst.len() {
            let lim = min(8, dst.len() - idx);
            dst[idx..idx + lim].copy_from_slice(&self.next_u64().to_ne_bytes()[..lim]);
            idx += lim;
        }
    }
}

pub fn seed_urandom() -> io::Result<u64> {
    let mut file = File::open("/dev/urandom")?;
    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// The crate's default generator, seeded from `/dev/urandom` when available
pub fn default_rng() -> WyRng {
    WyRng::seeded(seed_urandom().unwrap_or_else(|_| rand::random()))
}
