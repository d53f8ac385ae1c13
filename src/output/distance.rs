use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 特徴ベクトル間の距離関数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFunction {
    L2,
    L2Squared,
    L1,
    /// 要素ごとの差の最大値（L∞）
    Infinity,
    /// 1 - cos(角度)
    Cosine,
    /// 非ゼロを1とみなした場合の不一致数
    Hamming,
    /// aの最大要素の位置でのaとbの差
    MaximalDimensionDifference,
}

impl DistanceFunction {
    pub fn all() -> &'static [DistanceFunction] {
        &[
            Self::L2,
            Self::L2Squared,
            Self::L1,
            Self::Infinity,
            Self::Cosine,
            Self::Hamming,
            Self::MaximalDimensionDifference,
        ]
    }

    /// 2つのベクトル間の距離を計算
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f64> {
        if a.len() != b.len() {
            bail!("Cannot compare vectors of different lengths ({} vs {})", a.len(), b.len());
        }
        if a.is_empty() {
            bail!("Cannot compare empty vectors");
        }

        let pairs = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64, *y as f64));
        let distance = match self {
            Self::L2 => pairs.map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt(),
            Self::L2Squared => pairs.map(|(x, y)| (x - y).powi(2)).sum(),
            Self::L1 => pairs.map(|(x, y)| (x - y).abs()).sum(),
            Self::Infinity => pairs.map(|(x, y)| (x - y).abs()).fold(0.0, f64::max),
            Self::Cosine => {
                let (dot, norm_a, norm_b) = pairs.fold((0.0, 0.0, 0.0), |(dot, na, nb), (x, y)| {
                    (dot + x * y, na + x * x, nb + y * y)
                });
                let denominator = norm_a.sqrt() * norm_b.sqrt();
                if denominator == 0.0 {
                    bail!("Cosine distance is undefined for zero vectors");
                }
                1.0 - dot / denominator
            }
            Self::Hamming => pairs.filter(|(x, y)| (*x != 0.0) != (*y != 0.0)).count() as f64,
            Self::MaximalDimensionDifference => {
                let (index, _) = a
                    .iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, value)| {
                        if *value > best.1 {
                            (i, *value)
                        } else {
                            best
                        }
                    });
                (a[index] as f64 - b[index] as f64).abs()
            }
        };

        Ok(distance)
    }
}

impl fmt::Display for DistanceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::L2 => "l2",
            Self::L2Squared => "l2_squared",
            Self::L1 => "l1",
            Self::Infinity => "infinity",
            Self::Cosine => "cosine",
            Self::Hamming => "hamming",
            Self::MaximalDimensionDifference => "maximal_dimension_difference",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DistanceFunction {
    type Err = anyhow::Error;

    /// 表示名に加えて短縮名（l2sqr, linfinity, maxdim, lp1, lp2）も受け付ける
    fn from_str(s: &str) -> Result<Self> {
        let name = s.to_ascii_lowercase();
        let function = match name.as_str() {
            "lp2" => Self::L2,
            "l2sqr" => Self::L2Squared,
            "lp1" => Self::L1,
            "linfinity" => Self::Infinity,
            "maxdim" => Self::MaximalDimensionDifference,
            _ => match Self::all().iter().find(|function| function.to_string() == name) {
                Some(function) => *function,
                None => {
                    let available: Vec<String> =
                        Self::all().iter().map(|function| function.to_string()).collect();
                    bail!(
                        "Unknown distance function: {s} (available: {})",
                        available.join(", ")
                    );
                }
            },
        };
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: [f32; 3] = [1.0, 0.0, 2.0];
    const B: [f32; 3] = [0.0, 0.0, 4.0];

    #[test]
    fn test_norm_distances() {
        assert!((DistanceFunction::L2.distance(&A, &B).unwrap() - 5f64.sqrt()).abs() < 1e-9);
        assert_eq!(DistanceFunction::L2Squared.distance(&A, &B).unwrap(), 5.0);
        assert_eq!(DistanceFunction::L1.distance(&A, &B).unwrap(), 3.0);
        assert_eq!(DistanceFunction::Infinity.distance(&A, &B).unwrap(), 2.0);
    }

    #[test]
    fn test_cosine_distance() {
        let same = DistanceFunction::Cosine.distance(&A, &A).unwrap();
        assert!(same.abs() < 1e-9);

        let orthogonal = DistanceFunction::Cosine
            .distance(&[1.0, 0.0], &[0.0, 1.0])
            .unwrap();
        assert!((orthogonal - 1.0).abs() < 1e-9);

        assert!(DistanceFunction::Cosine.distance(&[0.0], &[1.0]).is_err());
    }

    #[test]
    fn test_hamming_and_maximal_dimension() {
        assert_eq!(DistanceFunction::Hamming.distance(&A, &B).unwrap(), 1.0);
        // Aの最大要素はインデックス2
        assert_eq!(
            DistanceFunction::MaximalDimensionDifference
                .distance(&A, &B)
                .unwrap(),
            2.0
        );
    }

    #[test]
    fn test_identical_vectors_have_zero_distance() {
        for function in DistanceFunction::all() {
            if *function == DistanceFunction::Cosine {
                continue;
            }
            assert_eq!(function.distance(&A, &A).unwrap(), 0.0, "{function}");
        }
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(DistanceFunction::L2.distance(&[1.0], &[1.0, 2.0]).is_err());
        assert!(DistanceFunction::L1.distance(&[], &[]).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("L2".parse::<DistanceFunction>().unwrap(), DistanceFunction::L2);
        assert_eq!(
            "maximal_dimension_difference".parse::<DistanceFunction>().unwrap(),
            DistanceFunction::MaximalDimensionDifference
        );
        assert_eq!("L2Sqr".parse::<DistanceFunction>().unwrap(), DistanceFunction::L2Squared);
        assert_eq!("linfinity".parse::<DistanceFunction>().unwrap(), DistanceFunction::Infinity);
        assert_eq!("lp1".parse::<DistanceFunction>().unwrap(), DistanceFunction::L1);
        assert_eq!(
            "MaxDim".parse::<DistanceFunction>().unwrap(),
            DistanceFunction::MaximalDimensionDifference
        );

        let error = "manhattan".parse::<DistanceFunction>().unwrap_err();
        assert!(error.to_string().contains("hamming"));
    }
}
