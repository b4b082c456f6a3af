//! Many-address entry points.
//!
//! `batch_geocode` fans single-address cascades out over a bounded pool.
//! `bulk_geocode` lets the providers ranked ahead of the bulk-capable one
//! answer first, pushes what they leave through the batch endpoint, and
//! sends the remainder back to the pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use common::{run_cancellable, AddressInput, GeocodeResult};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::cascade::Geocoder;
use crate::normalize::cache_key;
use crate::provider::BulkProvider;

/// What a pooled worker runs for one address.
#[derive(Debug, Clone)]
enum Stage {
    /// Only the providers before position `until`, without cache traffic.
    Leading { until: usize },
    /// Cached resolution starting at position `from`.
    Resolve { from: usize, prior: Option<String> },
}

#[derive(Debug)]
struct Job {
    idx: usize,
    addr: AddressInput,
    stage: Stage,
}

impl Job {
    fn full(idx: usize, addr: AddressInput) -> Self {
        Self {
            idx,
            addr,
            stage: Stage::Resolve { from: 0, prior: None },
        }
    }
}

/// Give every address without an id its position in the batch.
pub fn assign_ids(addrs: &mut [AddressInput]) {
    for (idx, addr) in addrs.iter_mut().enumerate() {
        if addr.id.trim().is_empty() {
            addr.id = idx.to_string();
        }
    }
}

fn matched_count(results: &[GeocodeResult]) -> usize {
    results.iter().filter(|r| r.matched).count()
}

impl Geocoder {
    /// Resolve every address, index-aligned with the input.
    ///
    /// Slots that never finished (cancellation, panicked worker) hold
    /// `GeocodeResult::default()`, which is unmatched with an empty source.
    pub async fn batch_geocode(
        &self,
        cancel: &CancellationToken,
        mut addrs: Vec<AddressInput>,
    ) -> Vec<GeocodeResult> {
        let started = Instant::now();
        assign_ids(&mut addrs);

        let mut results = vec![GeocodeResult::default(); addrs.len()];
        let jobs = addrs
            .into_iter()
            .enumerate()
            .map(|(idx, addr)| Job::full(idx, addr))
            .collect();
        for (idx, result) in self.run_pool(cancel, jobs).await {
            results[idx] = result;
        }

        info!(
            total = results.len(),
            matched = matched_count(&results),
            cancelled = cancel.is_cancelled(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch geocode complete"
        );
        results
    }

    /// Batch resolution that uses a provider's bulk endpoint at that
    /// provider's place in the cascade.
    ///
    /// Falls back to [`batch_geocode`](Self::batch_geocode) when no
    /// available provider has the bulk capability.
    pub async fn bulk_geocode(
        &self,
        cancel: &CancellationToken,
        mut addrs: Vec<AddressInput>,
    ) -> Vec<GeocodeResult> {
        let Some((position, bulk_name, bulk)) = self.bulk_provider() else {
            debug!("No bulk-capable provider available, using per-address cascade");
            return self.batch_geocode(cancel, addrs).await;
        };

        let started = Instant::now();
        assign_ids(&mut addrs);
        let keys: Vec<String> = addrs.iter().map(cache_key).collect();
        let mut results = vec![GeocodeResult::default(); addrs.len()];

        let mut misses = match self.answer_from_cache(cancel, &keys, &mut results).await {
            Some(misses) => misses,
            None => return results,
        };
        let cache_hits = addrs.len() - misses.len();

        // Last provider each row already tried ahead of the bulk one.
        let mut prior: HashMap<usize, String> = HashMap::new();

        if self.providers[..position].iter().any(|p| p.available()) {
            let jobs = misses
                .iter()
                .map(|&idx| Job {
                    idx,
                    addr: addrs[idx].clone(),
                    stage: Stage::Leading { until: position },
                })
                .collect();

            let mut answered = Vec::new();
            for (idx, result) in self.run_pool(cancel, jobs).await {
                if result.matched {
                    results[idx] = result;
                    answered.push(idx);
                } else if !result.source.is_empty() {
                    prior.insert(idx, result.source);
                }
            }
            debug!(
                rows = misses.len(),
                matched = answered.len(),
                "Leading providers answered ahead of bulk submission"
            );
            self.store_all(cancel, &keys, &results, answered).await;

            if cancel.is_cancelled() {
                return results;
            }
            misses.retain(|&idx| !results[idx].matched);
        }

        let chunk_size = self.bulk_chunk_size.min(bulk.max_batch_size()).max(1);
        let mut leftovers: Vec<Job> = Vec::new();
        let rest_of_cascade = |idx: usize, addrs: &[AddressInput], prior: Option<String>| Job {
            idx,
            addr: addrs[idx].clone(),
            stage: Stage::Resolve {
                from: position,
                prior,
            },
        };

        for chunk in misses.chunks(chunk_size) {
            if cancel.is_cancelled() {
                return results;
            }

            // Positional ids keep correlation safe from duplicate caller ids.
            let submission: Vec<AddressInput> = chunk
                .iter()
                .map(|&idx| addrs[idx].clone().with_id(idx.to_string()))
                .collect();

            let mut answers = match run_cancellable(cancel, bulk.geocode_bulk(cancel, &submission))
                .instrument(self.span().clone())
                .await
            {
                Ok(answers) => answers,
                Err(e) if e.is_cancelled() => return results,
                Err(e) => {
                    warn!(
                        provider = bulk_name,
                        rows = chunk.len(),
                        error = %e,
                        "Bulk submission failed, falling back to per-address cascade"
                    );
                    leftovers.extend(
                        chunk
                            .iter()
                            .map(|&idx| rest_of_cascade(idx, &addrs, prior.remove(&idx))),
                    );
                    continue;
                }
            };

            let mut answered = Vec::new();
            for &idx in chunk {
                match answers.remove(&idx.to_string()) {
                    Some(result) if result.matched => {
                        results[idx] = result;
                        answered.push(idx);
                    }
                    Some(_) => leftovers.push(Job {
                        idx,
                        addr: addrs[idx].clone(),
                        stage: Stage::Resolve {
                            from: position + 1,
                            prior: Some(bulk_name.to_string()),
                        },
                    }),
                    None => leftovers.push(rest_of_cascade(idx, &addrs, prior.remove(&idx))),
                }
            }
            self.store_all(cancel, &keys, &results, answered).await;
        }

        let rerun = leftovers.len();
        for (idx, result) in self.run_pool(cancel, leftovers).await {
            results[idx] = result;
        }

        info!(
            total = results.len(),
            cache_hits,
            rerun,
            matched = matched_count(&results),
            provider = bulk_name,
            cancelled = cancel.is_cancelled(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk geocode complete"
        );
        results
    }

    /// First available bulk-capable provider and its place in the order.
    fn bulk_provider(&self) -> Option<(usize, &str, &dyn BulkProvider)> {
        self.providers
            .iter()
            .enumerate()
            .filter(|(_, p)| p.available())
            .find_map(|(position, p)| p.bulk().map(|b| (position, p.name(), b)))
    }

    /// Fill cache hits into `results` and return the indices that missed.
    ///
    /// `None` means the batch was cancelled while probing.
    async fn answer_from_cache(
        &self,
        cancel: &CancellationToken,
        keys: &[String],
        results: &mut [GeocodeResult],
    ) -> Option<Vec<usize>> {
        if self.cache.is_none() {
            return Some((0..keys.len()).collect());
        }

        let probes: Vec<_> = stream::iter(keys.iter().enumerate())
            .map(|(idx, key)| async move { (idx, self.cache_lookup(cancel, key).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut misses = Vec::new();
        for (idx, probe) in probes {
            match probe {
                Ok(Some(hit)) => results[idx] = hit,
                Ok(None) => misses.push(idx),
                Err(_) => return None,
            }
        }
        misses.sort_unstable();
        Some(misses)
    }

    async fn store_all(
        &self,
        cancel: &CancellationToken,
        keys: &[String],
        results: &[GeocodeResult],
        indices: Vec<usize>,
    ) {
        stream::iter(indices)
            .for_each_concurrent(self.concurrency, |idx| async move {
                self.cache_store(cancel, &keys[idx], &results[idx]).await;
            })
            .await;
    }

    /// Run each job with at most `concurrency` in flight and return the
    /// ones that finished.
    ///
    /// Stops handing out work once `cancel` fires; in-flight cascades
    /// observe the same token and abort their outbound calls.
    async fn run_pool(
        &self,
        cancel: &CancellationToken,
        jobs: Vec<Job>,
    ) -> Vec<(usize, GeocodeResult)> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for job in jobs {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let geocoder = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let Job { idx, addr, stage } = job;
                let outcome = match stage {
                    Stage::Leading { until } => {
                        geocoder
                            .cascade(&cancel, &addr, 0..until, None)
                            .instrument(geocoder.span().clone())
                            .await
                    }
                    Stage::Resolve { from, prior } => {
                        geocoder
                            .resolve(&cancel, &addr, from, prior.as_deref())
                            .await
                    }
                };
                (idx, outcome)
            });
        }

        let mut finished = Vec::new();
        let mut aborted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(result))) => finished.push((idx, result)),
                Ok((_, Err(_))) => aborted += 1,
                Err(e) => warn!(error = %e, "Geocode worker panicked"),
            }
        }

        if aborted > 0 {
            debug!(aborted, "Cascades cut short by cancellation");
        }
        finished
    }
}
