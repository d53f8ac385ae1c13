// MapEvaluator - 抽出済み特徴の検索精度（mAP）評価
//
// クエリ画像ごとに全画像との距離を計算して昇順に並べ、同じクラスの画像が
// どれだけ上位に来るかを平均適合率で測る。全クエリの平均が mAP。

pub mod annotation;

pub use annotation::{parse_annotations, read_annotations, ImageAnnotation};

use crate::output::DistanceFunction;
use anyhow::{bail, Result};
use serde::Serialize;
use std::time::Instant;

/// 1クエリ分の評価結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub id: usize,
    pub class_id: i64,
    pub average_precision: f64,
}

/// 評価全体の結果
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub distance: DistanceFunction,
    pub top_k: usize,
    pub exclude_query: bool,
    pub images: usize,
    pub queries: Vec<QueryResult>,
    pub mean_average_precision: f64,
}

pub struct MapEvaluator {
    features: Vec<Vec<f32>>,
    annotations: Vec<ImageAnnotation>,
    distance: DistanceFunction,
    top_k: usize,
    exclude_query: bool,
}

impl MapEvaluator {
    /// 特徴ベクトルとアノテーションは同じ順序（行番号 = 画像ID）で対応している必要がある
    pub fn new(features: Vec<Vec<f32>>, annotations: Vec<ImageAnnotation>) -> Result<Self> {
        if features.len() != annotations.len() {
            bail!(
                "Number of loaded features ({}) and number of images in the annotation file ({}) are not equal",
                features.len(),
                annotations.len()
            );
        }
        if let Some(first) = features.first() {
            if let Some((id, feature)) = features
                .iter()
                .enumerate()
                .find(|(_, feature)| feature.len() != first.len())
            {
                bail!(
                    "Feature {id} has {} values, expected {}",
                    feature.len(),
                    first.len()
                );
            }
        }
        if !annotations.iter().any(|annotation| annotation.is_query) {
            bail!("Annotation file marks no query images");
        }

        Ok(Self {
            features,
            annotations,
            distance: DistanceFunction::L2Squared,
            top_k: 0,
            exclude_query: false,
        })
    }

    pub fn with_distance(mut self, distance: DistanceFunction) -> Self {
        self.distance = distance;
        self
    }

    /// 上位K件だけを評価する（0で全件）
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// クエリ自身を検索結果から除外する
    pub fn with_exclude_query(mut self, exclude_query: bool) -> Self {
        self.exclude_query = exclude_query;
        self
    }

    pub fn evaluate(&self) -> Result<EvaluationReport> {
        let start_time = Instant::now();
        let queries: Vec<&ImageAnnotation> = self
            .annotations
            .iter()
            .filter(|annotation| annotation.is_query)
            .collect();

        let mut results = Vec::with_capacity(queries.len());
        for (n, query) in queries.iter().enumerate() {
            let ranking = self.rank(query.id)?;
            let average_precision = self.average_precision(query, &ranking);
            log::info!(
                "Query {} of {}, average precision: {average_precision}",
                n + 1,
                queries.len()
            );
            results.push(QueryResult {
                id: query.id,
                class_id: query.class_id,
                average_precision,
            });
        }

        let mean_average_precision =
            results.iter().map(|r| r.average_precision).sum::<f64>() / results.len() as f64;
        log::info!(
            "Evaluated {} queries in {:.3} seconds (distance: {})",
            results.len(),
            start_time.elapsed().as_secs_f64(),
            self.distance
        );

        Ok(EvaluationReport {
            distance: self.distance,
            top_k: self.top_k,
            exclude_query: self.exclude_query,
            images: self.features.len(),
            queries: results,
            mean_average_precision,
        })
    }

    /// クエリからの距離が近い順の画像ID（同距離はID順）
    fn rank(&self, query: usize) -> Result<Vec<usize>> {
        let query_vector = &self.features[query];
        let mut distances = self
            .features
            .iter()
            .enumerate()
            .map(|(id, feature)| {
                self.distance
                    .distance(query_vector, feature)
                    .map(|distance| (id, distance))
            })
            .collect::<Result<Vec<_>>>()?;

        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(distances.into_iter().map(|(id, _)| id).collect())
    }

    /// 台形則で適合率-再現率曲線の下の面積を求める
    fn average_precision(&self, query: &ImageAnnotation, ranking: &[usize]) -> f64 {
        let mut matches = query.class_count as f64;
        let mut result_count = ranking.len();
        if self.exclude_query {
            matches -= 1.0;
            result_count = result_count.saturating_sub(1);
        }

        if self.top_k > 0 {
            if self.top_k as f64 > matches {
                log::warn!(
                    "Top K ({}) is higher than match count: {matches}",
                    self.top_k
                );
            }
            result_count = result_count.min(self.top_k);
            matches = matches.min(result_count as f64);
        }

        if matches <= 0.0 {
            log::warn!(
                "Query {} has no other images of class {}",
                query.id,
                query.class_id
            );
            return 0.0;
        }

        let mut average_precision = 0.0;
        let mut old_recall = 0.0;
        let mut old_precision = 1.0;
        let mut match_count = 0.0;
        let mut rank = 0usize;

        for &id in ranking {
            if rank == result_count {
                break;
            }
            if self.exclude_query && id == query.id {
                continue;
            }
            rank += 1;

            if self.annotations[id].class_id == query.class_id {
                match_count += 1.0;
            }
            let recall = match_count / matches;
            let precision = match_count / rank as f64;

            average_precision += (recall - old_recall) * (old_precision + precision) / 2.0;
            old_recall = recall;
            old_precision = precision;
        }

        average_precision
    }
}
