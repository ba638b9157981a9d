use crate::error::{MappingError, Result};
use crate::text::content_tokens;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use trialmap_anchors::sha256_hex;
use trialmap_embeddings::{cosine_similarity, mean_vector};
use trialmap_protocol::{ClusterStats, HeadingBlock, HeadingCluster};

/// Ratio of the distance threshold under which clusters merge in the embedding pass.
const EMBEDDING_MERGE_RATIO: f64 = 0.7;
/// `max_df` only bites once the corpus has this many headings.
const MAX_DF_MIN_CORPUS: usize = 4;
const TOP_TERMS: usize = 5;
const REPRESENTATIVE_TITLES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusteringConfig {
    /// Terms must appear in at least this many headings.
    #[serde(default = "default_min_df")]
    pub min_df: usize,
    /// Terms appearing in more than this share of headings are dropped.
    #[serde(default = "default_max_df")]
    pub max_df: f64,
    /// Average-linkage cosine distance under which clusters merge.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    /// Run the embedding post-pass when embeddings are supplied.
    #[serde(default = "default_use_embeddings")]
    pub use_embeddings: bool,
}

const fn default_min_df() -> usize {
    1
}
const fn default_max_df() -> f64 {
    0.9
}
const fn default_distance_threshold() -> f64 {
    0.6
}
const fn default_min_cluster_size() -> usize {
    2
}
const fn default_use_embeddings() -> bool {
    true
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_df: default_min_df(),
            max_df: default_max_df(),
            distance_threshold: default_distance_threshold(),
            min_cluster_size: default_min_cluster_size(),
            use_embeddings: default_use_embeddings(),
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.min_df == 0 {
            return Err("min_df must be >= 1".to_string());
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err("max_df must be within (0, 1]".to_string());
        }
        if !(self.distance_threshold > 0.0 && self.distance_threshold <= 2.0) {
            return Err("distance_threshold must be within (0, 2]".to_string());
        }
        if self.min_cluster_size == 0 {
            return Err("min_cluster_size must be >= 1".to_string());
        }
        Ok(())
    }
}

/// TF-IDF representation of a heading corpus.
struct TfIdf {
    vocabulary: Vec<String>,
    /// Rows are L2-normalized heading vectors.
    matrix: Array2<f64>,
}

impl TfIdf {
    fn fit(headings: &[&str], config: &ClusteringConfig) -> Self {
        let docs: Vec<Vec<String>> = headings.iter().map(|h| heading_terms(h)).collect();
        let n = docs.len();

        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for terms in &docs {
            let mut seen: Vec<&str> = terms.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let max_df_count = config.max_df * n as f64;
        let vocabulary: Vec<String> = df
            .iter()
            .filter(|(_, count)| **count >= config.min_df)
            .filter(|(_, count)| {
                #[allow(clippy::cast_precision_loss)]
                let count = **count as f64;
                n < MAX_DF_MIN_CORPUS || count <= max_df_count
            })
            .map(|(term, _)| (*term).to_string())
            .collect();
        let index: HashMap<&str, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.as_str(), idx))
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let idf = Array1::from_iter(vocabulary.iter().map(|term| {
            let doc_freq = df.get(term.as_str()).copied().unwrap_or(0) as f64;
            ((1.0 + n as f64) / (1.0 + doc_freq)).ln() + 1.0
        }));

        let mut matrix = Array2::<f64>::zeros((n, vocabulary.len()));
        for (row, terms) in docs.iter().enumerate() {
            for term in terms {
                if let Some(&col) = index.get(term.as_str()) {
                    matrix[[row, col]] += 1.0;
                }
            }
        }
        for mut row in matrix.rows_mut() {
            row *= &idf;
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }

        Self { vocabulary, matrix }
    }

    /// Pairwise cosine distance; headings without terms sit at distance 1 from all.
    fn distances(&self) -> Array2<f64> {
        let similarity = self.matrix.dot(&self.matrix.t());
        let n = self.matrix.nrows();
        let mut distances = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    distances[[i, j]] = (1.0 - similarity[[i, j]]).clamp(0.0, 2.0);
                }
            }
        }
        distances
    }
}

/// Unigrams plus bigrams of adjacent content tokens.
fn heading_terms(heading: &str) -> Vec<String> {
    let unigrams = content_tokens(heading);
    let bigrams: Vec<String> = unigrams
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect();
    unigrams.into_iter().chain(bigrams).collect()
}

/// Agglomerative, average-linkage clustering of heading blocks.
///
/// Advisory only: the output feeds a bounded prior into topic scoring and never
/// decides an assignment on its own.
#[derive(Debug, Clone)]
pub struct HeadingClusterer {
    config: ClusteringConfig,
}

impl HeadingClusterer {
    pub fn new(config: ClusteringConfig) -> Result<Self> {
        config.validate().map_err(MappingError::InvalidConfig)?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Cluster `blocks`. `embeddings`, when given, must be aligned with `blocks`.
    pub fn cluster(
        &self,
        blocks: &[HeadingBlock],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<Vec<HeadingCluster>> {
        if let Some(vectors) = embeddings {
            if vectors.len() != blocks.len() {
                return Err(MappingError::DimensionMismatch {
                    subject: "heading block embeddings".to_string(),
                    expected: blocks.len(),
                    actual: vectors.len(),
                });
            }
        }
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let headings: Vec<&str> = blocks.iter().map(|b| b.normalized_heading.as_str()).collect();
        let tfidf = TfIdf::fit(&headings, &self.config);
        let distances = tfidf.distances();

        let mut groups = average_linkage(&distances, self.config.distance_threshold);
        let mut merged_by_embedding = vec![false; groups.len()];
        if let (true, Some(vectors)) = (self.config.use_embeddings, embeddings) {
            (groups, merged_by_embedding) = self.embedding_pass(groups, vectors);
        }

        let mut clusters: Vec<(usize, HeadingCluster)> = groups
            .into_iter()
            .zip(merged_by_embedding)
            .filter(|(members, _)| members.len() >= self.config.min_cluster_size)
            .map(|(mut members, merged)| {
                members.sort_unstable();
                let first = members[0];
                (first, build_cluster(&members, blocks, &tfidf, &distances, merged))
            })
            .collect();
        clusters.sort_by_key(|(first, _)| *first);

        log::debug!(
            "clustered {} headings into {} clusters (threshold {:.2})",
            blocks.len(),
            clusters.len(),
            self.config.distance_threshold
        );
        Ok(clusters.into_iter().map(|(_, c)| c).collect())
    }

    fn embedding_pass(
        &self,
        mut groups: Vec<Vec<usize>>,
        vectors: &[Vec<f32>],
    ) -> (Vec<Vec<usize>>, Vec<bool>) {
        let limit = EMBEDDING_MERGE_RATIO * self.config.distance_threshold;
        let mut merged = vec![false; groups.len()];

        loop {
            let means: Vec<Vec<f32>> = groups
                .iter()
                .map(|members| {
                    let refs: Vec<&[f32]> = members.iter().map(|&i| vectors[i].as_slice()).collect();
                    mean_vector(&refs)
                })
                .collect();

            let mut best: Option<(f64, usize, usize)> = None;
            for i in 0..groups.len() {
                for j in (i + 1)..groups.len() {
                    let distance = 1.0 - f64::from(cosine_similarity(&means[i], &means[j]));
                    if distance < limit && best.map_or(true, |(d, _, _)| distance < d) {
                        best = Some((distance, i, j));
                    }
                }
            }

            let Some((_, i, j)) = best else {
                break;
            };
            let absorbed = groups.remove(j);
            merged.remove(j);
            groups[i].extend(absorbed);
            merged[i] = true;
        }
        (groups, merged)
    }
}

/// Average-linkage agglomeration (Lance-Williams update). Returns member index groups
/// ordered by their first member.
fn average_linkage(distances: &Array2<f64>, threshold: f64) -> Vec<Vec<usize>> {
    let n = distances.nrows();
    let mut d = distances.clone();
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut active = vec![true; n];

    loop {
        let mut best: Option<(f64, usize, usize)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let distance = d[[i, j]];
                if best.map_or(true, |(b, _, _)| distance < b) {
                    best = Some((distance, i, j));
                }
            }
        }

        let Some((distance, i, j)) = best else {
            break;
        };
        if distance >= threshold {
            break;
        }

        #[allow(clippy::cast_precision_loss)]
        let (size_i, size_j) = (members[i].len() as f64, members[j].len() as f64);
        for k in 0..n {
            if !active[k] || k == i || k == j {
                continue;
            }
            let updated = (size_i * d[[i, k]] + size_j * d[[j, k]]) / (size_i + size_j);
            d[[i, k]] = updated;
            d[[k, i]] = updated;
        }
        let absorbed = std::mem::take(&mut members[j]);
        members[i].extend(absorbed);
        active[j] = false;
    }

    members
        .into_iter()
        .zip(active)
        .filter(|(_, alive)| *alive)
        .map(|(group, _)| group)
        .collect()
}

fn build_cluster(
    members: &[usize],
    blocks: &[HeadingBlock],
    tfidf: &TfIdf,
    distances: &Array2<f64>,
    merged_by_embedding: bool,
) -> HeadingCluster {
    let mut member_block_ids: Vec<String> = members
        .iter()
        .map(|&i| blocks[i].heading_block_id.clone())
        .collect();

    let mut sorted_ids = member_block_ids.clone();
    sorted_ids.sort();
    let cluster_id = format!("hc:{}", &sha256_hex(sorted_ids.join("\n").as_bytes())[..24]);

    // Most frequent normalized headings first, first occurrence breaks ties.
    let mut title_counts: Vec<(String, usize, usize)> = Vec::new();
    for (pos, &i) in members.iter().enumerate() {
        let key = &blocks[i].normalized_heading;
        match title_counts.iter_mut().find(|(k, _, _)| k == key) {
            Some(entry) => entry.1 += 1,
            None => title_counts.push((key.clone(), 1, pos)),
        }
    }
    title_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    let representative_titles: Vec<String> = title_counts
        .iter()
        .take(REPRESENTATIVE_TITLES)
        .map(|(_, _, pos)| blocks[members[*pos]].heading_text.clone())
        .collect();

    let mut weights = vec![0.0f64; tfidf.vocabulary.len()];
    for &i in members {
        for (col, value) in tfidf.matrix.row(i).iter().enumerate() {
            weights[col] += value;
        }
    }
    let mut ranked: Vec<(usize, f64)> = weights
        .into_iter()
        .enumerate()
        .filter(|(_, w)| *w > 0.0)
        .collect();
    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| tfidf.vocabulary[a.0].cmp(&tfidf.vocabulary[b.0]))
    });
    let top_terms = ranked
        .iter()
        .take(TOP_TERMS)
        .map(|(col, _)| tfidf.vocabulary[*col].clone())
        .collect();

    let mut pair_sum = 0.0;
    let mut pairs = 0usize;
    for (a, &i) in members.iter().enumerate() {
        for &j in &members[a + 1..] {
            pair_sum += distances[[i, j]];
            pairs += 1;
        }
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let mean_intra_distance = if pairs == 0 {
        0.0
    } else {
        (pair_sum / pairs as f64) as f32
    };

    member_block_ids.shrink_to_fit();
    HeadingCluster {
        cluster_id,
        stats: ClusterStats {
            size: member_block_ids.len(),
            mean_intra_distance,
            top_terms,
            merged_by_embedding,
        },
        member_block_ids,
        representative_titles,
    }
}

/// Block id → cluster lookup.
#[must_use]
pub fn cluster_index(clusters: &[HeadingCluster]) -> HashMap<&str, &HeadingCluster> {
    clusters
        .iter()
        .flat_map(|c| c.member_block_ids.iter().map(move |id| (id.as_str(), c)))
        .collect()
}
