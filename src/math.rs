use nalgebra as na;

/// Least-squares fit of `y = a * x + b`, returns `(a, b)`.
///
/// `None` when the system is degenerate (fewer than two distinct `x`).
pub fn linear_ls(x: &na::DVector<f64>, y: &na::DVector<f64>) -> Option<na::Vector2<f64>> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }

    let n = x.len() as f64;
    let s_x = x.sum();
    let s_x2 = x.map(|x| x * x).sum();
    let s_xy = x.zip_map(y, |x, y| x * y).sum();
    let s_y = y.sum();

    if (n * s_x2 - s_x * s_x).abs() < 1e-12 {
        return None;
    }

    let a = na::Matrix2::new(s_x2, s_x, s_x, n);
    let b = na::Vector2::new(s_xy, s_y);

    let qr_result = a.qr();
    let qty = qr_result.q().transpose() * b;

    qr_result.r().solve_upper_triangular(&qty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exact_line() {
        let x = na::DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let y = x.map(|x| 4.0 * x - 2.0);

        let beta = linear_ls(&x, &y).unwrap();
        assert!((beta[0] - 4.0).abs() < 1e-9);
        assert!((beta[1] + 2.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_input_has_no_fit() {
        let x = na::DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let y = na::DVector::from_vec(vec![0.0, 1.0, 2.0]);
        assert!(linear_ls(&x, &y).is_none());
    }
}
