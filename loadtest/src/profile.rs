//! A module for defining a [`Profile`] of simulated clients that load test the product API.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

use crate::counter::ProductCounter;
use crate::error::ProfileError;
use crate::http::Transport;
use crate::operation::{MANUFACTURER, Operation, OperationKind, ProductDetails, sku_for};

/// Identifiers used for reads of products that may exist.
pub const PRODUCT_IDS: RangeInclusive<u32> = 1..=100;
/// Identifiers used for reads of products that never exist.
pub const MISSING_PRODUCT_IDS: RangeInclusive<u32> = 100_000..=999_999;

const CATEGORY_IDS: RangeInclusive<u32> = 1..=10;
const WEIGHTS: RangeInclusive<u32> = 100..=5000;
const OTHER_IDS: RangeInclusive<u32> = 1..=100;

/// Relative weights for selecting the next operation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct OperationWeights {
    /// Weight of reading a random product.
    pub read: u32,
    /// Weight of probing the health endpoint.
    pub health: u32,
    /// Weight of creating product details.
    pub create: u32,
    /// Weight of reading a product that does not exist.
    pub read_missing: u32,
}

impl OperationWeights {
    fn as_array(&self) -> [u32; 4] {
        // Same order as `OperationKind::ALL`.
        [self.read, self.health, self.create, self.read_missing]
    }

    /// Returns the configured weight of the given operation kind.
    pub fn get(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::ReadProduct => self.read,
            OperationKind::Health => self.health,
            OperationKind::CreateProduct => self.create,
            OperationKind::ReadMissingProduct => self.read_missing,
        }
    }
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            read: 3,
            health: 1,
            create: 1,
            read_missing: 1,
        }
    }
}

/// A builder for creating a [`Profile`].
#[derive(Debug)]
pub struct ProfileBuilder {
    name: String,
    clients: usize,
    spawn_rate: Option<f64>,
    seed: u64,

    wait_min: Duration,
    wait_max: Duration,

    weights: OperationWeights,
    transport: Transport,
    request_timeout: Duration,
    strict_status: bool,
}

impl ProfileBuilder {
    /// The number of simulated clients running concurrently.
    pub fn clients(mut self, clients: usize) -> Self {
        self.clients = clients;
        self
    }

    /// The number of clients started per second.
    ///
    /// When unset, all clients start at once.
    pub fn spawn_rate(mut self, spawn_rate: Option<f64>) -> Self {
        self.spawn_rate = spawn_rate;
        self
    }

    /// Seed for the random number generators of all clients.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Range of the random pause between two operations of a client.
    pub fn wait_time(mut self, min: Duration, max: Duration) -> Self {
        self.wait_min = min;
        self.wait_max = max;
        self
    }

    /// The ratio between the different operations.
    pub fn operation_weights(mut self, weights: OperationWeights) -> Self {
        self.weights = weights;
        self
    }

    /// The transport used to issue requests.
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Timeout applied to every request by the transport.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Treat error statuses as failures for operations without explicit classification.
    pub fn strict_status(mut self, strict: bool) -> Self {
        self.strict_status = strict;
        self
    }

    /// Creates the profile instance.
    pub fn build(self) -> Result<Profile, ProfileError> {
        if self.clients == 0 {
            return Err(ProfileError::NoClients);
        }
        if self.wait_min > self.wait_max {
            return Err(ProfileError::WaitTime {
                min: self.wait_min,
                max: self.wait_max,
            });
        }
        let spawn_interval = match self.spawn_rate {
            Some(rate) if rate.is_finite() && rate > 0.0 => {
                let interval = Duration::try_from_secs_f64(rate.recip())
                    .map_err(|_| ProfileError::SpawnRate(rate))?;
                Some(interval)
            }
            Some(rate) => return Err(ProfileError::SpawnRate(rate)),
            None => None,
        };

        let operation_distribution = WeightedIndex::new(self.weights.as_array())?;

        Ok(Profile {
            name: self.name,
            clients: self.clients,
            spawn_interval,
            seed: self.seed,

            wait_time: self.wait_min..=self.wait_max,
            weights: self.weights,
            operation_distribution,

            transport: self.transport,
            request_timeout: self.request_timeout,
            strict_status: self.strict_status,

            counter: ProductCounter::default(),
        })
    }
}

/// Specification of a group of simulated clients that run against the product API.
#[derive(Debug)]
pub struct Profile {
    /// Name of the profile for identification in logs and reports.
    pub(crate) name: String,
    /// The number of simulated clients.
    pub(crate) clients: usize,
    /// Pause between starting two clients, or all at once.
    pub(crate) spawn_interval: Option<Duration>,
    /// Base seed, combined with the client index.
    seed: u64,

    /// Pause between two operations of a client.
    wait_time: RangeInclusive<Duration>,
    weights: OperationWeights,
    /// A distribution over the indexes of [`OperationKind::ALL`].
    operation_distribution: WeightedIndex<u32>,

    pub(crate) transport: Transport,
    pub(crate) request_timeout: Duration,
    pub(crate) strict_status: bool,

    /// Generates identifiers for create operations, shared by all clients.
    counter: ProductCounter,
}

impl Profile {
    /// Constructs a new profile builder with the given name.
    pub fn builder(name: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder {
            name: name.into(),
            clients: 1,
            spawn_rate: None,
            seed: rand::random(),

            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(3),

            weights: OperationWeights::default(),
            transport: Transport::default(),
            request_timeout: Duration::from_secs(60),
            strict_status: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clients(&self) -> usize {
        self.clients
    }

    pub fn weights(&self) -> OperationWeights {
        self.weights
    }

    /// The counter shared by all clients of this profile.
    pub fn counter(&self) -> &ProductCounter {
        &self.counter
    }

    /// Creates the simulated client with the given index.
    ///
    /// Clients created with the same index and seed produce the same sequence of operations,
    /// except for identifiers drawn from the shared counter.
    pub fn client(self: &Arc<Self>, index: usize) -> SimulatedClient {
        SimulatedClient {
            profile: Arc::clone(self),
            index,
            rng: SmallRng::seed_from_u64(self.seed.wrapping_add(index as u64)),
        }
    }
}

/// One virtual user executing a loop of randomized operations.
#[derive(Debug)]
pub struct SimulatedClient {
    profile: Arc<Profile>,
    index: usize,
    rng: SmallRng,
}

impl SimulatedClient {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Draws the next operation and all of its parameters.
    pub fn next_operation(&mut self) -> Operation {
        let index = self.profile.operation_distribution.sample(&mut self.rng);
        match OperationKind::ALL[index] {
            OperationKind::Health => Operation::Health,
            OperationKind::ReadProduct => Operation::ReadProduct {
                product_id: self.rng.random_range(PRODUCT_IDS),
            },
            OperationKind::CreateProduct => {
                let product_id = self.profile.counter.next_product_id();
                Operation::CreateProduct(ProductDetails {
                    product_id,
                    sku: sku_for(product_id),
                    manufacturer: MANUFACTURER.to_owned(),
                    category_id: self.rng.random_range(CATEGORY_IDS),
                    weight: self.rng.random_range(WEIGHTS),
                    some_other_id: self.rng.random_range(OTHER_IDS),
                })
            }
            OperationKind::ReadMissingProduct => Operation::ReadMissingProduct {
                product_id: self.rng.random_range(MISSING_PRODUCT_IDS),
            },
        }
    }

    /// Draws the pause before the next operation.
    pub fn next_wait(&mut self) -> Duration {
        self.rng.random_range(self.profile.wait_time.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn client(builder: ProfileBuilder) -> SimulatedClient {
        Arc::new(builder.seed(1234).build().unwrap()).client(0)
    }

    #[test]
    fn selection_converges_to_weights() {
        let mut client = client(Profile::builder("test"));

        let iterations = 60_000;
        let mut counts = BTreeMap::<OperationKind, usize>::new();
        for _ in 0..iterations {
            *counts.entry(client.next_operation().kind()).or_default() += 1;
        }

        let weights = OperationWeights::default();
        let total_weight: u32 = weights.as_array().iter().sum();
        for kind in OperationKind::ALL {
            let expected = weights.get(kind) as f64 / total_weight as f64;
            let actual = counts[&kind] as f64 / iterations as f64;
            assert!(
                (expected - actual).abs() < 0.01,
                "{kind}: expected {expected:.3}, got {actual:.3}"
            );
        }
    }

    #[test]
    fn parameters_stay_in_range() {
        let mut client = client(Profile::builder("test"));

        for _ in 0..10_000 {
            match client.next_operation() {
                Operation::Health => {}
                Operation::ReadProduct { product_id } => {
                    assert!(PRODUCT_IDS.contains(&product_id));
                    assert!(!MISSING_PRODUCT_IDS.contains(&product_id));
                }
                Operation::ReadMissingProduct { product_id } => {
                    assert!(MISSING_PRODUCT_IDS.contains(&product_id));
                    assert!(!PRODUCT_IDS.contains(&product_id));
                }
                Operation::CreateProduct(details) => {
                    assert!((1..=1000).contains(&details.product_id));
                    assert_eq!(details.sku, sku_for(details.product_id));
                    assert_eq!(details.manufacturer, MANUFACTURER);
                    assert!(CATEGORY_IDS.contains(&details.category_id));
                    assert!(WEIGHTS.contains(&details.weight));
                    assert!(OTHER_IDS.contains(&details.some_other_id));
                }
            }
        }
    }

    #[test]
    fn creates_share_the_profile_counter() {
        let weights = OperationWeights {
            read: 0,
            health: 0,
            create: 1,
            read_missing: 0,
        };
        let profile = Arc::new(
            Profile::builder("test")
                .operation_weights(weights)
                .build()
                .unwrap(),
        );
        let mut first = profile.client(0);
        let mut second = profile.client(1);

        let ids: Vec<_> = (0..4)
            .map(|i| {
                let client = if i % 2 == 0 { &mut first } else { &mut second };
                match client.next_operation() {
                    Operation::CreateProduct(details) => details.product_id,
                    other => panic!("unexpected operation {other:?}"),
                }
            })
            .collect();

        assert_eq!(ids, [2, 3, 4, 5]);
        assert_eq!(profile.counter().value(), 4);
    }

    #[test]
    fn wait_time_stays_in_range() {
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(2);
        let mut client = client(Profile::builder("test").wait_time(min, max));

        for _ in 0..1_000 {
            let wait = client.next_wait();
            assert!(wait >= min && wait <= max, "{wait:?}");
        }
    }

    #[test]
    fn fixed_wait_time() {
        let wait = Duration::from_millis(5);
        let mut client = client(Profile::builder("test").wait_time(wait, wait));
        assert_eq!(client.next_wait(), wait);
    }

    #[test]
    fn same_seed_same_sequence() {
        let profile = Arc::new(Profile::builder("test").seed(7).build().unwrap());
        let reads = |mut client: SimulatedClient| {
            std::iter::repeat_with(move || client.next_operation())
                .filter(|op| op.kind() != OperationKind::CreateProduct)
                .take(20)
                .collect::<Vec<_>>()
        };

        assert_eq!(reads(profile.client(3)), reads(profile.client(3)));
    }

    #[test]
    fn rejects_invalid_settings() {
        let zero = OperationWeights {
            read: 0,
            health: 0,
            create: 0,
            read_missing: 0,
        };
        assert!(matches!(
            Profile::builder("test").operation_weights(zero).build(),
            Err(ProfileError::Weights(_))
        ));
        assert!(matches!(
            Profile::builder("test")
                .wait_time(Duration::from_secs(3), Duration::from_secs(1))
                .build(),
            Err(ProfileError::WaitTime { .. })
        ));
        assert!(matches!(
            Profile::builder("test").clients(0).build(),
            Err(ProfileError::NoClients)
        ));
        assert!(matches!(
            Profile::builder("test").spawn_rate(Some(0.0)).build(),
            Err(ProfileError::SpawnRate(_))
        ));
        for rate in [f64::NAN, f64::INFINITY, -1.0, 1e-30] {
            assert!(
                matches!(
                    Profile::builder("test").spawn_rate(Some(rate)).build(),
                    Err(ProfileError::SpawnRate(_))
                ),
                "spawn rate {rate} was accepted"
            );
        }
    }

    #[test]
    fn spawn_rate_becomes_interval() {
        let profile = Profile::builder("test")
            .spawn_rate(Some(4.0))
            .build()
            .unwrap();
        assert_eq!(profile.spawn_interval, Some(Duration::from_millis(250)));

        let profile = Profile::builder("test").build().unwrap();
        assert_eq!(profile.spawn_interval, None);
    }
}
