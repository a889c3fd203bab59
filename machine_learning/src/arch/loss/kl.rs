use ndarray::{Array2, ArrayView2, Zip};

/// KL divergence between a diagonal gaussian `N(mean, exp(log_var))` and the standard
/// normal prior, averaged over every latent element of the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct GaussianKl;

impl GaussianKl {
    pub fn loss(&self, mean: ArrayView2<f32>, log_var: ArrayView2<f32>) -> f32 {
        if mean.is_empty() {
            return 0.;
        }

        let mut sum = 0.;
        Zip::from(&mean)
            .and(&log_var)
            .for_each(|&mu, &lv| sum += 1. + lv - mu.powi(2) - lv.exp());

        -0.5 * sum / mean.len() as f32
    }

    /// Returns the derivatives with respect to the mean and the log variance.
    pub fn loss_prime(
        &self,
        mean: ArrayView2<f32>,
        log_var: ArrayView2<f32>,
    ) -> (Array2<f32>, Array2<f32>) {
        let n = mean.len().max(1) as f32;

        let d_mean = mean.mapv(|mu| mu / n);
        let d_log_var = log_var.mapv(|lv| 0.5 * (lv.exp() - 1.) / n);
        (d_mean, d_log_var)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn zero_at_the_prior() {
        let zeros = Array2::zeros((4, 3));
        assert_eq!(GaussianKl.loss(zeros.view(), zeros.view()), 0.);

        let (d_mean, d_log_var) = GaussianKl.loss_prime(zeros.view(), zeros.view());
        assert!(d_mean.iter().chain(d_log_var.iter()).all(|&d| d == 0.));
    }

    #[test]
    fn positive_away_from_the_prior() {
        let mean = array![[1f32, -1.]];
        let log_var = array![[0.5f32, -0.5]];

        assert!(GaussianKl.loss(mean.view(), log_var.view()) > 0.);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let mean = array![[0.3f32, -0.8], [1.2, 0.1]];
        let log_var = array![[-0.4f32, 0.6], [0.2, -1.1]];
        let (d_mean, d_log_var) = GaussianKl.loss_prime(mean.view(), log_var.view());

        let h = 1e-2;
        for i in 0..2 {
            for j in 0..2 {
                let mut plus = mean.clone();
                plus[[i, j]] += h;
                let mut minus = mean.clone();
                minus[[i, j]] -= h;
                let numeric = (GaussianKl.loss(plus.view(), log_var.view())
                    - GaussianKl.loss(minus.view(), log_var.view()))
                    / (2. * h);
                assert!((numeric - d_mean[[i, j]]).abs() < 1e-3);

                let mut plus = log_var.clone();
                plus[[i, j]] += h;
                let mut minus = log_var.clone();
                minus[[i, j]] -= h;
                let numeric = (GaussianKl.loss(mean.view(), plus.view())
                    - GaussianKl.loss(mean.view(), minus.view()))
                    / (2. * h);
                assert!((numeric - d_log_var[[i, j]]).abs() < 1e-3);
            }
        }
    }
}
