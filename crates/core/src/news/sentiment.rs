use crate::domain::article::{Article, LabeledArticle, RelevanceVerdict, Target};
use crate::error::ClassificationError;
use crate::llm::SentimentClassifier;
use crate::news::fanout::{self, FanoutPolicy, ItemFailure};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SentimentReport {
    pub labeled: Vec<LabeledArticle>,
    pub failures: Vec<ItemFailure>,
}

pub struct SentimentStage {
    classifier: Arc<dyn SentimentClassifier>,
    policy: FanoutPolicy,
}

impl SentimentStage {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, policy: FanoutPolicy) -> Self {
        Self { classifier, policy }
    }

    /// Labels each relevant article. An article whose call fails is left out of
    /// the result rather than counted as neutral.
    pub async fn classify(
        &self,
        target: &Target,
        relevant: Vec<(Article, RelevanceVerdict)>,
    ) -> SentimentReport {
        let titles: Vec<String> = relevant.iter().map(|(a, _)| a.title.clone()).collect();

        let outcomes = fanout::run_each(relevant, self.policy, |(article, relevance)| {
            let classifier = Arc::clone(&self.classifier);
            let target = target.clone();
            async move {
                let sentiment = classifier.classify_sentiment(&article, &target).await?;
                Ok::<_, ClassificationError>(LabeledArticle {
                    article,
                    relevance,
                    sentiment,
                })
            }
        })
        .await;

        let mut report = SentimentReport::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(labeled) => report.labeled.push(labeled),
                Err(error) => {
                    tracing::warn!(
                        ticker = %target.ticker,
                        index,
                        title = %titles[index],
                        error = %error,
                        "sentiment classification failed; excluding article"
                    );
                    report.failures.push(ItemFailure {
                        index,
                        title: titles[index].clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            ticker = %target.ticker,
            provider = self.classifier.provider().as_str(),
            labeled = report.labeled.len(),
            failed = report.failures.len(),
            "sentiment classification done"
        );
        report
    }
}
