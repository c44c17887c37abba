//! Pull-based point iterators and the combinators that stitch them together.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt::Debug,
    sync::Arc,
};

use crate::{DynError, IteratorOptions, Point};

#[derive(Debug, thiserror::Error)]
pub enum IteratorError {
    #[error("failed to create iterator: {0}")]
    Create(#[source] DynError),

    #[error("failed to read from iterator: {0}")]
    Read(#[source] DynError),
}

/// A source of points, pulled one at a time.
pub trait PointIterator: Debug + Send {
    /// Return the next point, or `None` once exhausted.
    fn next_point(&mut self) -> Result<Option<Point>, IteratorError>;

    /// Release any resources held by the iterator. Further calls to
    /// [`next_point`](Self::next_point) return `None`.
    fn close(&mut self) {}
}

pub type SendablePointIterator = Box<dyn PointIterator>;

/// Anything able to open a [`PointIterator`] for a set of options.
pub trait IteratorCreator: Debug + Send + Sync {
    fn create_iterator(
        &self,
        opt: &IteratorOptions,
    ) -> Result<SendablePointIterator, IteratorError>;
}

/// Combines a list of [`IteratorCreator`]s into a single iterator.
pub trait IteratorComposer: Debug + Send + Sync {
    fn compose(
        &self,
        creators: Vec<Arc<dyn IteratorCreator>>,
        opt: IteratorOptions,
    ) -> Result<SendablePointIterator, IteratorError>;
}

/// [`IteratorComposer`] producing a [`LazyIterator`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LazyComposer;

impl IteratorComposer for LazyComposer {
    fn compose(
        &self,
        creators: Vec<Arc<dyn IteratorCreator>>,
        opt: IteratorOptions,
    ) -> Result<SendablePointIterator, IteratorError> {
        Ok(Box::new(LazyIterator::new(creators, opt)))
    }
}

/// Drains a list of [`IteratorCreator`]s in order, opening each creator's
/// iterator only once the previous one is exhausted and the consumer asks for
/// another point.
///
/// Nothing is opened until the first call to
/// [`next_point`](PointIterator::next_point).
#[derive(Debug)]
pub struct LazyIterator {
    creators: VecDeque<Arc<dyn IteratorCreator>>,
    opt: IteratorOptions,
    current: Option<SendablePointIterator>,
}

impl LazyIterator {
    pub fn new(creators: Vec<Arc<dyn IteratorCreator>>, opt: IteratorOptions) -> Self {
        Self {
            creators: creators.into(),
            opt,
            current: None,
        }
    }

    /// Number of creators whose iterator has not been opened yet.
    pub fn pending(&self) -> usize {
        self.creators.len()
    }
}

impl PointIterator for LazyIterator {
    fn next_point(&mut self) -> Result<Option<Point>, IteratorError> {
        loop {
            let itr = match &mut self.current {
                Some(itr) => itr,
                slot => {
                    let Some(creator) = self.creators.pop_front() else {
                        return Ok(None);
                    };
                    slot.insert(creator.create_iterator(&self.opt)?)
                }
            };

            match itr.next_point()? {
                Some(p) => return Ok(Some(p)),
                None => {
                    itr.close();
                    self.current = None;
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut itr) = self.current.take() {
            itr.close();
        }
        self.creators.clear();
    }
}

/// Iterator over an in-memory list of points.
#[derive(Debug, Default)]
pub struct VecIterator {
    points: VecDeque<Point>,
}

impl VecIterator {
    pub fn new(points: impl IntoIterator<Item = Point>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }
}

impl PointIterator for VecIterator {
    fn next_point(&mut self) -> Result<Option<Point>, IteratorError> {
        Ok(self.points.pop_front())
    }

    fn close(&mut self) {
        self.points.clear();
    }
}

/// Merges several iterators, each already ordered by (name, tags, time), into
/// a single iterator with the same ordering.
///
/// When `ascending` is false the inputs, and the output, are ordered in
/// reverse.
#[derive(Debug)]
pub struct SortedMergeIterator {
    inputs: Vec<SendablePointIterator>,
    heap: BinaryHeap<HeapItem>,
    ascending: bool,
    /// Number of inputs whose first point has been pulled.
    primed: usize,
    /// Input whose head was last returned and has yet to be pulled again.
    refill: Option<usize>,
}

impl SortedMergeIterator {
    pub fn new(inputs: Vec<SendablePointIterator>, ascending: bool) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(inputs.len()),
            inputs,
            ascending,
            primed: 0,
            refill: None,
        }
    }

    fn pull(&mut self, input: usize) -> Result<(), IteratorError> {
        if let Some(point) = self.inputs[input].next_point()? {
            self.heap.push(HeapItem {
                point,
                input,
                ascending: self.ascending,
            });
        }
        Ok(())
    }
}

impl PointIterator for SortedMergeIterator {
    fn next_point(&mut self) -> Result<Option<Point>, IteratorError> {
        while self.primed < self.inputs.len() {
            self.pull(self.primed)?;
            self.primed += 1;
        }
        if let Some(input) = self.refill {
            self.pull(input)?;
            self.refill = None;
        }

        let Some(item) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill = Some(item.input);
        Ok(Some(item.point))
    }

    fn close(&mut self) {
        for itr in &mut self.inputs {
            itr.close();
        }
        self.heap.clear();
        self.primed = self.inputs.len();
        self.refill = None;
    }
}

#[derive(Debug)]
struct HeapItem {
    point: Point,
    input: usize,
    ascending: bool,
}

impl HeapItem {
    /// Output order of two items, smallest first.
    fn output_order(&self, other: &Self) -> Ordering {
        let key = self
            .point
            .name
            .cmp(&other.point.name)
            .then_with(|| self.point.tags.cmp(&other.point.tags))
            .then_with(|| self.point.time.cmp(&other.point.time));
        let key = if self.ascending { key } else { key.reverse() };
        key.then_with(|| self.input.cmp(&other.input))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.output_order(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // BinaryHeap pops the greatest item first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.output_order(other).reverse()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{FieldValue, Tags};

    fn point(name: &str, host: &str, time: i64) -> Point {
        Point::new(
            name,
            Tags::from([("host".to_string(), host.to_string())]),
            time,
            FieldValue::Integer(time),
        )
    }

    fn drain(itr: &mut dyn PointIterator) -> Vec<(String, String, i64)> {
        let mut out = vec![];
        while let Some(p) = itr.next_point().unwrap() {
            out.push((p.name, p.tags["host"].clone(), p.time));
        }
        out
    }

    /// Counts how many iterators it has opened.
    #[derive(Debug)]
    struct CountingCreator {
        points: Vec<Point>,
        opened: Arc<AtomicUsize>,
    }

    impl IteratorCreator for CountingCreator {
        fn create_iterator(
            &self,
            _opt: &IteratorOptions,
        ) -> Result<SendablePointIterator, IteratorError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(VecIterator::new(self.points.clone())))
        }
    }

    #[derive(Debug)]
    struct FailingCreator;

    impl IteratorCreator for FailingCreator {
        fn create_iterator(
            &self,
            _opt: &IteratorOptions,
        ) -> Result<SendablePointIterator, IteratorError> {
            Err(IteratorError::Create("shard closed".into()))
        }
    }

    #[test]
    fn test_lazy_iterator_opens_on_demand() {
        let opened = Arc::new(AtomicUsize::new(0));
        let creators: Vec<Arc<dyn IteratorCreator>> = vec![
            Arc::new(CountingCreator {
                points: vec![point("cpu", "a", 1), point("cpu", "a", 2)],
                opened: Arc::clone(&opened),
            }),
            Arc::new(CountingCreator {
                points: vec![],
                opened: Arc::clone(&opened),
            }),
            Arc::new(CountingCreator {
                points: vec![point("cpu", "b", 1)],
                opened: Arc::clone(&opened),
            }),
        ];

        let mut itr = LazyComposer
            .compose(creators, IteratorOptions::default())
            .unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 0);

        assert_matches!(itr.next_point(), Ok(Some(p)) if p.time == 1);
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        assert_eq!(
            drain(itr.as_mut()),
            vec![("cpu".to_string(), "a".to_string(), 2), ("cpu".to_string(), "b".to_string(), 1)]
        );
        assert_eq!(opened.load(Ordering::SeqCst), 3);
        assert_matches!(itr.next_point(), Ok(None));
    }

    #[test]
    fn test_lazy_iterator_close_drops_pending() {
        let opened = Arc::new(AtomicUsize::new(0));
        let creators: Vec<Arc<dyn IteratorCreator>> = (0..3)
            .map(|_| {
                Arc::new(CountingCreator {
                    points: vec![point("cpu", "a", 1)],
                    opened: Arc::clone(&opened),
                }) as _
            })
            .collect();

        let mut itr = LazyIterator::new(creators, IteratorOptions::default());
        assert_eq!(itr.pending(), 3);
        itr.next_point().unwrap();
        itr.close();
        assert_eq!(itr.pending(), 0);
        assert_matches!(itr.next_point(), Ok(None));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_iterator_create_error() {
        let mut itr = LazyIterator::new(vec![Arc::new(FailingCreator)], IteratorOptions::default());
        assert_matches!(itr.next_point(), Err(IteratorError::Create(_)));
    }

    #[test]
    fn test_sorted_merge() {
        let a = VecIterator::new([point("cpu", "a", 1), point("cpu", "a", 5), point("mem", "a", 0)]);
        let b = VecIterator::new([point("cpu", "a", 3), point("cpu", "b", 0)]);
        let c = VecIterator::default();

        let mut itr = SortedMergeIterator::new(vec![Box::new(a), Box::new(b), Box::new(c)], true);
        let got = drain(&mut itr);
        let want = [
            ("cpu", "a", 1),
            ("cpu", "a", 3),
            ("cpu", "a", 5),
            ("cpu", "b", 0),
            ("mem", "a", 0),
        ]
        .map(|(n, h, t)| (n.to_string(), h.to_string(), t))
        .to_vec();
        assert_eq!(got, want);
    }

    #[test]
    fn test_sorted_merge_descending() {
        let a = VecIterator::new([point("cpu", "b", 4), point("cpu", "a", 5), point("cpu", "a", 1)]);
        let b = VecIterator::new([point("cpu", "a", 3)]);

        let mut itr = SortedMergeIterator::new(vec![Box::new(a), Box::new(b)], false);
        let times: Vec<_> = drain(&mut itr).into_iter().map(|(_, _, t)| t).collect();
        assert_eq!(times, vec![4, 5, 3, 1]);
    }

    /// Replays a script of reads.
    #[derive(Debug)]
    struct ScriptedIterator {
        reads: VecDeque<Result<Option<Point>, IteratorError>>,
    }

    impl PointIterator for ScriptedIterator {
        fn next_point(&mut self) -> Result<Option<Point>, IteratorError> {
            self.reads.pop_front().unwrap_or(Ok(None))
        }
    }

    #[test]
    fn test_sorted_merge_read_error_keeps_points() {
        let a = ScriptedIterator {
            reads: VecDeque::from([
                Ok(Some(point("cpu", "a", 1))),
                Err(IteratorError::Read("disk unavailable".into())),
            ]),
        };
        let b = VecIterator::new([point("cpu", "a", 2)]);

        let mut itr = SortedMergeIterator::new(vec![Box::new(a), Box::new(b)], true);
        assert_matches!(itr.next_point(), Ok(Some(p)) if p.time == 1);
        assert_matches!(itr.next_point(), Err(IteratorError::Read(_)));
        assert_matches!(itr.next_point(), Ok(Some(p)) if p.time == 2);
        assert_matches!(itr.next_point(), Ok(None));
    }
}
