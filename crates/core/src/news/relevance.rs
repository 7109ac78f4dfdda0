use crate::domain::article::{Article, RelevanceVerdict, Target};
use crate::error::ClassificationError;
use crate::llm::RelevanceClassifier;
use crate::news::fanout::{self, FanoutPolicy, ItemFailure};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RelevanceReport {
    /// Affirmatively relevant articles, in their original order.
    pub relevant: Vec<(Article, RelevanceVerdict)>,
    /// Relevant articles dropped by `max_relevant`, lowest scores first.
    pub overflow: usize,
    pub failures: Vec<ItemFailure>,
}

pub struct RelevanceFilter {
    classifier: Arc<dyn RelevanceClassifier>,
    policy: FanoutPolicy,
    max_relevant: usize,
}

impl RelevanceFilter {
    pub fn new(
        classifier: Arc<dyn RelevanceClassifier>,
        policy: FanoutPolicy,
        max_relevant: usize,
    ) -> Self {
        Self {
            classifier,
            policy,
            max_relevant,
        }
    }

    /// Keeps the articles the classifier marks relevant. A failed call excludes
    /// its article and is recorded; the rest of the batch is unaffected.
    pub async fn filter(&self, target: &Target, articles: Vec<Article>) -> RelevanceReport {
        let titles: Vec<String> = articles.iter().map(|a| a.title.clone()).collect();

        let outcomes = fanout::run_each(articles, self.policy, |article| {
            let classifier = Arc::clone(&self.classifier);
            let target = target.clone();
            async move {
                let verdict = classifier.classify_relevance(&article, &target).await?;
                Ok::<_, ClassificationError>((article, verdict))
            }
        })
        .await;

        let mut report = RelevanceReport::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok((article, verdict)) if verdict.relevant => {
                    report.relevant.push((article, verdict));
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(
                        ticker = %target.ticker,
                        index,
                        title = %titles[index],
                        error = %error,
                        "relevance classification failed; excluding article"
                    );
                    report.failures.push(ItemFailure {
                        index,
                        title: titles[index].clone(),
                        error,
                    });
                }
            }
        }

        report.overflow = keep_highest_scored(&mut report.relevant, self.max_relevant);

        tracing::info!(
            ticker = %target.ticker,
            provider = self.classifier.provider().as_str(),
            total = titles.len(),
            relevant = report.relevant.len(),
            overflow = report.overflow,
            failed = report.failures.len(),
            "relevance filter done"
        );
        report
    }
}

/// Keeps the `max` best-scored entries (earlier wins a tie) in their original
/// order and returns how many were dropped. Ungraded verdicts rank lowest.
fn keep_highest_scored(relevant: &mut Vec<(Article, RelevanceVerdict)>, max: usize) -> usize {
    if relevant.len() <= max {
        return 0;
    }

    let mut ranked: Vec<(usize, u8)> = relevant
        .iter()
        .enumerate()
        .map(|(i, (_, verdict))| (i, verdict.score.unwrap_or(0)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut keep = vec![false; relevant.len()];
    for &(i, _) in ranked.iter().take(max) {
        keep[i] = true;
    }

    let dropped = relevant.len() - max;
    let mut flags = keep.into_iter();
    relevant.retain(|_| flags.next().unwrap_or(false));
    dropped
}
