//! Legendre and Lobatto polynomials on [-1, 1].
//!
//! The Lobatto functions are the 1D building blocks of the hierarchic H1
//! shapeset:
//!
//! ```text
//! l0(x) = (1 - x) / 2
//! l1(x) = (1 + x) / 2
//! lk(x) = (P_k(x) - P_{k-2}(x)) / sqrt(2(2k - 1))      k >= 2
//! ```
//!
//! For `k >= 2` they vanish at both endpoints, `lk'(x) = sqrt((2k-1)/2) P_{k-1}(x)`,
//! so their derivatives are L2-orthonormal. They factor as
//! `lk(x) = (1 - x^2)/4 * kernel_{k-2}(x)`, which is what the triangle edge
//! functions are built from.

/// Legendre polynomial `P_n` with first and second derivatives at `x`.
pub fn legendre(n: usize, x: f64) -> (f64, f64, f64) {
    if n == 0 {
        return (1.0, 0.0, 0.0);
    }
    // (p, dp, d2p) for degrees k-1 and k
    let mut prev = (1.0, 0.0, 0.0);
    let mut curr = (x, 1.0, 0.0);
    for k in 1..n {
        let kf = k as f64;
        let p = ((2.0 * kf + 1.0) * x * curr.0 - kf * prev.0) / (kf + 1.0);
        let dp = prev.1 + (2.0 * kf + 1.0) * curr.0;
        let d2p = prev.2 + (2.0 * kf + 1.0) * curr.1;
        prev = curr;
        curr = (p, dp, d2p);
    }
    curr
}

/// Lobatto function `l_k(x)`.
pub fn lobatto(k: usize, x: f64) -> f64 {
    match k {
        0 => 0.5 * (1.0 - x),
        1 => 0.5 * (1.0 + x),
        _ => {
            let kf = k as f64;
            (legendre(k, x).0 - legendre(k - 2, x).0) / (2.0 * (2.0 * kf - 1.0)).sqrt()
        }
    }
}

/// Derivative `l_k'(x)`.
pub fn lobatto_derivative(k: usize, x: f64) -> f64 {
    match k {
        0 => -0.5,
        1 => 0.5,
        _ => {
            let kf = k as f64;
            ((2.0 * kf - 1.0) / 2.0).sqrt() * legendre(k - 1, x).0
        }
    }
}

/// Kernel function `kernel_{k-2}(x) = 4 l_k(x) / (1 - x^2)` and its derivative.
///
/// Evaluated through `P'_{k-1}` so it is regular at the endpoints.
pub fn kernel(k: usize, x: f64) -> (f64, f64) {
    debug_assert!(k >= 2, "kernel functions start at degree 2");
    let kf = k as f64;
    let scale = -4.0 * ((2.0 * kf - 1.0) / 2.0).sqrt() / (kf * (kf - 1.0));
    let (_, dp, d2p) = legendre(k - 1, x);
    (scale * dp, scale * d2p)
}
