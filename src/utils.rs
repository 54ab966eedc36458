use std::fmt;
use std::time::Instant;

/// A simple timer based on std::time::Instant, to implement the
/// std::fmt::Display trait on
pub struct Timer {
    time: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Timer {
            time: Instant::now(),
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:>68} {:>8.2} s",
            "elapsed time:",
            self.time.elapsed().as_secs_f32()
        )
    }
}

/// Indices that sort `v` ascending. The sort is stable, so degenerate
/// entries keep their original relative order.
pub fn argsort(v: &[f64]) -> Vec<usize> {
    let mut idx = (0..v.len()).collect::<Vec<_>>();
    idx.sort_by(|&i, &j| v[i].partial_cmp(&v[j]).unwrap());
    idx
}

#[test]
fn argsort_is_stable_for_ties() {
    let v = vec![0.5, -1.0, 0.5, -2.0];
    assert_eq!(argsort(&v), vec![3, 1, 0, 2]);
}
