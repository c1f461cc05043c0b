use std::fmt;

/// Python complex number.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    #[must_use]
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    #[must_use]
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.re - other.re, self.im - other.im)
    }

    #[must_use]
    pub fn mul(self, other: Self) -> Self {
        Self::new(
            self.re * other.re - self.im * other.im,
            self.re * other.im + self.im * other.re,
        )
    }

    /// Returns `None` when dividing by zero.
    #[must_use]
    pub fn div(self, other: Self) -> Option<Self> {
        let denom = other.re * other.re + other.im * other.im;
        if denom == 0.0 {
            return None;
        }
        Some(Self::new(
            (self.re * other.re + self.im * other.im) / denom,
            (self.im * other.re - self.re * other.im) / denom,
        ))
    }

    /// `r ** e` for a negative real base and fractional exponent.
    #[must_use]
    pub fn real_pow(base: f64, exponent: f64) -> Self {
        let magnitude = base.abs().powf(exponent);
        let angle = std::f64::consts::PI * exponent;
        Self::new(magnitude * angle.cos(), magnitude * angle.sin())
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let im = crate::format::float_repr(self.im);
        let im = im.strip_suffix(".0").unwrap_or(&im);
        if self.re == 0.0 && self.re.is_sign_positive() {
            return write!(f, "{im}j");
        }
        let re = crate::format::float_repr(self.re);
        let re = re.strip_suffix(".0").unwrap_or(&re);
        let sign = if im.starts_with('-') { "" } else { "+" };
        write!(f, "({re}{sign}{im}j)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_matches_python() {
        assert_eq!(Complex::new(1.0, 2.0).to_string(), "(1+2j)");
        assert_eq!(Complex::new(0.0, 1.5).to_string(), "1.5j");
        assert_eq!(Complex::new(1.0, -1.0).to_string(), "(1-1j)");
    }

    #[test]
    fn division() {
        let q = Complex::new(4.0, 2.0).div(Complex::new(0.0, 2.0)).unwrap();
        assert_eq!(q, Complex::new(1.0, -2.0));
        assert!(Complex::new(1.0, 0.0).div(Complex::default()).is_none());
    }
}
