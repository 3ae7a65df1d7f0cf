use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use rand::{seq::SliceRandom, Rng};

use crate::{
    distances::distance,
    geolocations::Geocoder,
    structs::{Coordinate, FilmRecord, RankedFilm},
};

pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_PACING: Duration = Duration::from_millis(700);

/// Source of elapsed time and blocking pauses for a ranking run.
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Lookup results of a single run, keyed by the raw address string.
/// Unresolvable addresses are cached as `None` and never queried again.
#[derive(Debug, Default)]
struct GeocodeCache {
    entries: HashMap<String, Option<Coordinate>>,
    hits: usize,
}

impl GeocodeCache {
    /// Cached result for `address`, counting a hit when there is one.
    fn lookup_cached(&mut self, address: &str) -> Option<Option<Coordinate>> {
        let cached = self.entries.get(address).copied();
        if cached.is_some() {
            self.hits += 1;
        }
        cached
    }

    fn insert(&mut self, address: String, coordinate: Option<Coordinate>) {
        self.entries.insert(address, coordinate);
    }

    fn hits(&self) -> usize {
        self.hits
    }

    /// Number of distinct addresses that were looked up.
    fn lookups(&self) -> usize {
        self.entries.len()
    }
}

struct Candidate<'a> {
    distance: f64,
    title: &'a str,
    coordinate: Coordinate,
}

pub struct NearestFilmFinder<G, C> {
    geocoder: G,
    clock: C,
    pacing: Duration,
    max_results: usize,
}

impl<G: Geocoder, C: Clock> NearestFilmFinder<G, C> {
    pub fn new(geocoder: G, clock: C) -> Self {
        Self {
            geocoder,
            clock,
            pacing: DEFAULT_PACING,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn find_closest(
        &self,
        records: &[FilmRecord],
        query: Coordinate,
        max_wait: Duration,
    ) -> Vec<RankedFilm> {
        self.find_closest_with_rng(records, query, max_wait, &mut rand::thread_rng())
    }

    /// Ranks `records` by distance to `query`, geocoding addresses in random
    /// order until `max_wait` has elapsed. The budget is checked after every
    /// record, so at least one record is processed if any are given.
    pub fn find_closest_with_rng<R: Rng + ?Sized>(
        &self,
        records: &[FilmRecord],
        query: Coordinate,
        max_wait: Duration,
        rng: &mut R,
    ) -> Vec<RankedFilm> {
        let started = self.clock.now();

        let mut order = records.iter().collect::<Vec<_>>();
        order.shuffle(rng);

        let mut cache = GeocodeCache::default();
        let mut candidates = Vec::new();
        let mut processed = 0;

        for record in order {
            let coordinate = match cache.lookup_cached(&record.address) {
                Some(cached) => cached,
                None => {
                    if cache.lookups() > 0 {
                        self.clock.sleep(self.pacing);
                    }
                    let resolved = self.geocoder.resolve(&record.address);
                    cache.insert(record.address.clone(), resolved);
                    resolved
                }
            };
            processed += 1;

            if let Some(coordinate) = coordinate {
                candidates.push(Candidate {
                    distance: distance(query, coordinate),
                    title: &record.title,
                    coordinate,
                });
            }

            let elapsed = self.clock.now().saturating_sub(started);
            if elapsed >= max_wait {
                log::info!(
                    "Wait budget of {:.1}s exhausted after {processed}/{} records",
                    max_wait.as_secs_f64(),
                    records.len()
                );
                break;
            }
        }

        log::debug!(
            "Processed {processed} records: {} lookups, {} cache hits, {} located",
            cache.lookups(),
            cache.hits(),
            candidates.len()
        );

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates
            .into_iter()
            .take(self.max_results)
            .map(|c| RankedFilm {
                title: c.title.to_owned(),
                coordinate: c.coordinate,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dataset, geolocations::LookupFailure};
    use rand::{rngs::StdRng, SeedableRng};
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct ManualClock {
        now: Cell<Duration>,
        slept: RefCell<Vec<Duration>>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
            self.advance(duration);
        }
    }

    /// Resolves "lat;lon" strings, everything else is not found.
    struct FakeGeocoder<'a> {
        calls: RefCell<HashMap<String, usize>>,
        latency: Duration,
        clock: Option<&'a ManualClock>,
    }

    impl<'a> FakeGeocoder<'a> {
        fn new() -> Self {
            Self {
                calls: RefCell::default(),
                latency: Duration::ZERO,
                clock: None,
            }
        }

        fn with_latency(clock: &'a ManualClock, latency: Duration) -> Self {
            Self {
                calls: RefCell::default(),
                latency,
                clock: Some(clock),
            }
        }

        fn total_calls(&self) -> usize {
            self.calls.borrow().values().sum()
        }
    }

    impl Geocoder for FakeGeocoder<'_> {
        fn lookup(&self, address: &str) -> Result<Coordinate, LookupFailure> {
            *self.calls.borrow_mut().entry(address.to_owned()).or_default() += 1;
            if let Some(clock) = self.clock {
                clock.advance(self.latency);
            }
            if address == "offline" {
                return Err(LookupFailure::Unavailable("503".into()));
            }
            let (lat, lon) = address.split_once(';').ok_or(LookupFailure::NotFound)?;
            match (lat.parse(), lon.parse()) {
                (Ok(lat), Ok(lon)) => Ok(Coordinate::new(lat, lon)),
                _ => Err(LookupFailure::NotFound),
            }
        }
    }

    fn film(title: &str, address: &str) -> FilmRecord {
        FilmRecord {
            title: title.into(),
            year: 2000,
            address: address.into(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    const FOREVER: Duration = Duration::from_secs(3600);
    const ORIGIN: Coordinate = Coordinate::new(0.0, 0.0);

    #[test]
    fn returns_at_most_ten_located_films() {
        let mut records = (0..30)
            .map(|i| film(&format!("film {i}"), &format!("{};{}", i, i)))
            .collect::<Vec<_>>();
        records.extend((0..5).map(|i| film(&format!("lost {i}"), "Nowhere")));
        records.push(film("offline", "offline"));

        let clock = ManualClock::default();
        let finder = NearestFilmFinder::new(FakeGeocoder::new(), &clock);
        let ranked = finder.find_closest_with_rng(&records, ORIGIN, FOREVER, &mut rng());

        assert_eq!(ranked.len(), 10);
        assert!(ranked
            .iter()
            .all(|r| !r.title.starts_with("lost") && r.title != "offline"));
        let titles = ranked.iter().map(|r| r.title.as_str()).collect::<Vec<_>>();
        let expected = (0..10).map(|i| format!("film {i}")).collect::<Vec<_>>();
        assert_eq!(titles, expected);
    }

    #[test]
    fn fewer_than_ten_when_few_resolve() {
        let records = vec![
            film("a", "1;1"),
            film("b", "Nowhere"),
            film("c", "2;2"),
        ];
        let clock = ManualClock::default();
        let finder = NearestFilmFinder::new(FakeGeocoder::new(), &clock);
        let ranked = finder.find_closest_with_rng(&records, ORIGIN, FOREVER, &mut rng());
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn each_address_is_looked_up_once() {
        let addresses = ["1;1", "2;2", "Nowhere"];
        let records = (0..12)
            .map(|i| film(&format!("film {i}"), addresses[i % addresses.len()]))
            .collect::<Vec<_>>();

        let clock = ManualClock::default();
        let geocoder = FakeGeocoder::new();
        let finder = NearestFilmFinder::new(&geocoder, &clock);
        let ranked = finder.find_closest_with_rng(&records, ORIGIN, FOREVER, &mut rng());

        assert_eq!(geocoder.calls.borrow().len(), 3);
        assert!(geocoder.calls.borrow().values().all(|&n| n == 1));
        assert_eq!(ranked.len(), 8);
    }

    #[test]
    fn pacing_only_between_lookups() {
        let records = vec![
            film("a", "1;1"),
            film("b", "1;1"),
            film("c", "2;2"),
            film("d", "Nowhere"),
            film("e", "2;2"),
        ];
        let clock = ManualClock::default();
        let finder = NearestFilmFinder::new(FakeGeocoder::new(), &clock)
            .with_pacing(Duration::from_millis(700));
        finder.find_closest_with_rng(&records, ORIGIN, FOREVER, &mut rng());

        assert_eq!(*clock.slept.borrow(), vec![Duration::from_millis(700); 2]);
    }

    #[test]
    fn zero_budget_processes_one_record() {
        let records = (0..5)
            .map(|i| film(&format!("film {i}"), &format!("{i};0")))
            .collect::<Vec<_>>();
        let clock = ManualClock::default();
        let geocoder = FakeGeocoder::new();
        let finder = NearestFilmFinder::new(&geocoder, &clock);
        let ranked = finder.find_closest_with_rng(&records, ORIGIN, Duration::ZERO, &mut rng());

        assert_eq!(geocoder.total_calls(), 1);
        assert!(ranked.len() <= 1);
        assert!(clock.slept.borrow().is_empty());
    }

    #[test]
    fn stops_when_budget_is_spent() {
        let records = (0..20)
            .map(|i| film(&format!("film {i}"), &format!("{i};0")))
            .collect::<Vec<_>>();
        let clock = ManualClock::default();
        let geocoder = FakeGeocoder::with_latency(&clock, Duration::from_secs(1));
        let finder = NearestFilmFinder::new(&geocoder, &clock).with_pacing(Duration::ZERO);
        let ranked = finder.find_closest_with_rng(
            &records,
            ORIGIN,
            Duration::from_millis(2500),
            &mut rng(),
        );

        // after the third lookup 3s have passed
        assert_eq!(geocoder.total_calls(), 3);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn pacing_counts_toward_budget() {
        let records = (0..20)
            .map(|i| film(&format!("film {i}"), &format!("{i};0")))
            .collect::<Vec<_>>();
        let clock = ManualClock::default();
        let geocoder = FakeGeocoder::new();
        let finder = NearestFilmFinder::new(&geocoder, &clock)
            .with_pacing(Duration::from_millis(700));
        finder.find_closest_with_rng(&records, ORIGIN, Duration::from_secs(2), &mut rng());

        // 0s, 0.7s, 1.4s, 2.1s
        assert_eq!(geocoder.total_calls(), 4);
    }

    #[test]
    fn ordered_by_distance() {
        let records = (0..40)
            .map(|i| {
                let lat = (i * 37 % 89) as f64;
                let lon = (i * 53 % 179) as f64 - 90.0;
                film(&format!("film {i}"), &format!("{lat};{lon}"))
            })
            .collect::<Vec<_>>();
        let query = Coordinate::new(49.84, 24.03);
        let clock = ManualClock::default();
        let finder = NearestFilmFinder::new(FakeGeocoder::new(), &clock).with_max_results(40);

        for seed in 0..5 {
            let ranked = finder.find_closest_with_rng(
                &records,
                query,
                FOREVER,
                &mut StdRng::seed_from_u64(seed),
            );
            assert_eq!(ranked.len(), 40);
            let distances = ranked
                .iter()
                .map(|r| distance(query, r.coordinate))
                .collect::<Vec<_>>();
            assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn cache_counts_hits_and_remembers_misses() {
        let mut cache = GeocodeCache::default();
        assert_eq!(cache.lookup_cached("Lviv"), None);
        cache.insert("Lviv".into(), Some(Coordinate::new(49.84, 24.03)));
        cache.insert("Nowhere".into(), None);

        assert_eq!(cache.lookup_cached("Lviv"), Some(Some(Coordinate::new(49.84, 24.03))));
        assert_eq!(cache.lookup_cached("Nowhere"), Some(None));
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.lookups(), 2);
    }

    #[test]
    fn empty_input() {
        let clock = ManualClock::default();
        let finder = NearestFilmFinder::new(FakeGeocoder::new(), &clock);
        assert!(finder
            .find_closest_with_rng(&[], ORIGIN, Duration::ZERO, &mut rng())
            .is_empty());
    }

    #[test]
    fn films_of_a_year_closest_first() {
        let data = "\
Lviv Story,2000,49.84;24.03
Kyiv Story,2000,50.45;30.52
Lost Story,2000,Nowhere
Paris Story,2000,48.86;2.35
Old Story,1999,49.84;24.04
";
        let records = dataset::read_records(data.as_bytes(), 2000).unwrap();
        assert_eq!(records.len(), 4);

        let query = Coordinate::new(49.84, 24.03);
        let clock = ManualClock::default();
        let finder = NearestFilmFinder::new(FakeGeocoder::new(), &clock);
        let ranked = finder.find_closest_with_rng(&records, query, FOREVER, &mut rng());

        let titles = ranked.iter().map(|r| r.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, ["Lviv Story", "Kyiv Story", "Paris Story"]);
        assert_eq!(distance(query, ranked[0].coordinate), 0.0);
    }
}
