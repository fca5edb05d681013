/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! An augmented AVL tree of closed time intervals.
//!
//! Every node caches the largest `high` of its subtree, which lets overlap
//! queries skip whole subtrees. Intervals are ordered by `low`, then `high`,
//! then by their payload, so equal intervals carrying different payloads can
//! coexist and be removed individually.

use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval<T> {
    pub low: f64,
    pub high: f64,
    pub data: T,
}

impl<T: Ord> Interval<T> {
    /// An interval whose `high` is never below its `low`.
    pub fn new(low: f64, high: f64, data: T) -> Interval<T> {
        Interval {
            low,
            high: high.max(low),
            data,
        }
    }

    fn overlaps(&self, low: f64, high: f64) -> bool {
        self.low <= high && low <= self.high
    }

    fn cmp_key(&self, other: &Interval<T>) -> Ordering {
        self.low
            .total_cmp(&other.low)
            .then_with(|| self.high.total_cmp(&other.high))
            .then_with(|| self.data.cmp(&other.data))
    }
}

type Link<T> = Option<Box<Node<T>>>;

struct Node<T> {
    interval: Interval<T>,
    max_high: f64,
    height: u8,
    left: Link<T>,
    right: Link<T>,
}

impl<T> Node<T> {
    fn leaf(interval: Interval<T>) -> Box<Node<T>> {
        Box::new(Node {
            max_high: interval.high,
            interval,
            height: 1,
            left: None,
            right: None,
        })
    }

    fn update(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
        self.max_high = self.interval.high;
        for child in [&self.left, &self.right].into_iter().flatten() {
            self.max_high = self.max_high.max(child.max_high);
        }
    }

    fn balance_factor(&self) -> i16 {
        height(&self.left) as i16 - height(&self.right) as i16
    }
}

fn height<T>(link: &Link<T>) -> u8 {
    link.as_ref().map_or(0, |node| node.height)
}

fn rotate_right<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    node.update();
    pivot.right = Some(node);
    pivot.update();
    pivot
}

fn rotate_left<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    node.update();
    pivot.left = Some(node);
    pivot.update();
    pivot
}

fn rebalance<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    node.update();
    let balance = node.balance_factor();
    if balance > 1 {
        if node.left.as_ref().is_some_and(|left| left.balance_factor() < 0) {
            node.left = node.left.take().map(rotate_left);
        }
        return rotate_right(node);
    }
    if balance < -1 {
        if node.right.as_ref().is_some_and(|right| right.balance_factor() > 0) {
            node.right = node.right.take().map(rotate_right);
        }
        return rotate_left(node);
    }
    node
}

fn insert<T: Ord>(link: Link<T>, interval: Interval<T>) -> Box<Node<T>> {
    let Some(mut node) = link else {
        return Node::leaf(interval);
    };
    if interval.cmp_key(&node.interval) == Ordering::Less {
        node.left = Some(insert(node.left.take(), interval));
    } else {
        node.right = Some(insert(node.right.take(), interval));
    }
    rebalance(node)
}

/// Detach the leftmost node of a subtree.
fn take_min<T>(mut node: Box<Node<T>>) -> (Link<T>, Box<Node<T>>) {
    match node.left.take() {
        None => (node.right.take(), node),
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        },
    }
}

fn remove<T: Ord>(link: Link<T>, interval: &Interval<T>, removed: &mut bool) -> Link<T> {
    let mut node = link?;
    match interval.cmp_key(&node.interval) {
        Ordering::Less => node.left = remove(node.left.take(), interval, removed),
        Ordering::Greater => node.right = remove(node.right.take(), interval, removed),
        Ordering::Equal => {
            *removed = true;
            return match (node.left.take(), node.right.take()) {
                (None, None) => None,
                (Some(child), None) | (None, Some(child)) => Some(child),
                (Some(left), Some(right)) => {
                    let (rest, mut successor) = take_min(right);
                    successor.left = Some(left);
                    successor.right = rest;
                    Some(rebalance(successor))
                },
            };
        },
    }
    Some(rebalance(node))
}

fn collect_overlaps<'a, T>(
    link: &'a Link<T>,
    low: f64,
    high: f64,
    result: &mut Vec<&'a Interval<T>>,
) where
    T: Ord,
{
    let Some(node) = link else {
        return;
    };
    if node.max_high < low {
        return;
    }
    collect_overlaps(&node.left, low, high, result);
    if node.interval.overlaps(low, high) {
        result.push(&node.interval);
    }
    // Everything on the right starts at or after this node.
    if node.interval.low <= high {
        collect_overlaps(&node.right, low, high, result);
    }
}

pub struct IntervalTree<T> {
    root: Link<T>,
    len: usize,
}

impl<T> Default for IntervalTree<T> {
    fn default() -> IntervalTree<T> {
        IntervalTree { root: None, len: 0 }
    }
}

impl<T: Ord> IntervalTree<T> {
    pub fn new() -> IntervalTree<T> {
        IntervalTree::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, interval: Interval<T>) {
        self.root = Some(insert(self.root.take(), interval));
        self.len += 1;
    }

    /// Remove one interval equal to `interval`, payload included.
    pub fn remove(&mut self, interval: &Interval<T>) -> bool {
        let mut removed = false;
        self.root = remove(self.root.take(), interval, &mut removed);
        if removed {
            self.len -= 1;
        }
        removed
    }

    pub fn contains(&self, interval: &Interval<T>) -> bool {
        let mut link = &self.root;
        while let Some(node) = link {
            link = match interval.cmp_key(&node.interval) {
                Ordering::Less => &node.left,
                Ordering::Greater => &node.right,
                Ordering::Equal => return true,
            };
        }
        false
    }

    /// All intervals intersecting the closed range `[low, high]`, in tree
    /// order.
    pub fn all_overlaps(&self, low: f64, high: f64) -> Vec<&Interval<T>> {
        let mut result = vec![];
        collect_overlaps(&self.root, low, high, &mut result);
        result
    }

    #[cfg(test)]
    fn height(&self) -> u8 {
        height(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo random numbers, so failures reproduce.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn time(&mut self) -> f64 {
            (self.next() % 200) as f64 / 4.0
        }
    }

    fn brute_force(intervals: &[Interval<u32>], low: f64, high: f64) -> Vec<u32> {
        let mut result: Vec<_> = intervals
            .iter()
            .filter(|interval| interval.low <= high && low <= interval.high)
            .collect();
        result.sort_by(|a, b| a.cmp_key(b));
        result.iter().map(|interval| interval.data).collect()
    }

    #[test]
    fn inverted_intervals_are_normalized() {
        let interval = Interval::new(5.0, 2.0, 0u32);
        assert_eq!(interval.low, 5.0);
        assert_eq!(interval.high, 5.0);
    }

    #[test]
    fn overlap_queries_are_inclusive() {
        let mut tree = IntervalTree::new();
        tree.insert(Interval::new(1.0, 3.0, 0u32));
        tree.insert(Interval::new(5.0, 5.0, 1));
        tree.insert(Interval::new(3.0, 4.0, 2));

        let at = |t: f64| -> Vec<u32> {
            tree.all_overlaps(t, t)
                .iter()
                .map(|interval| interval.data)
                .collect()
        };
        assert_eq!(at(3.0), vec![0, 2]);
        assert_eq!(at(5.0), vec![1]);
        assert_eq!(at(4.5), Vec::<u32>::new());
    }

    #[test]
    fn matches_brute_force_under_churn() {
        let mut rng = Lcg(0x5eed);
        let mut tree = IntervalTree::new();
        let mut reference: Vec<Interval<u32>> = vec![];

        for id in 0..600u32 {
            if !reference.is_empty() && rng.next() % 3 == 0 {
                let victim = reference.swap_remove((rng.next() as usize) % reference.len());
                assert!(tree.remove(&victim));
                assert!(!tree.contains(&victim));
            } else {
                let low = rng.time();
                let interval = Interval::new(low, low + rng.time() / 4.0, id);
                tree.insert(interval);
                reference.push(interval);
            }
            assert_eq!(tree.len(), reference.len());

            let low = rng.time();
            let high = low + rng.time() / 8.0;
            let found: Vec<u32> = tree
                .all_overlaps(low, high)
                .iter()
                .map(|interval| interval.data)
                .collect();
            assert_eq!(found, brute_force(&reference, low, high));
        }

        // An AVL tree is never taller than 1.44 log2(n + 2).
        let bound = 1.45 * ((tree.len() + 2) as f64).log2();
        assert!((tree.height() as f64) <= bound);
    }

    #[test]
    fn removing_a_missing_interval_is_a_no_op() {
        let mut tree = IntervalTree::new();
        tree.insert(Interval::new(1.0, 2.0, 1u32));
        assert!(!tree.remove(&Interval::new(1.0, 2.0, 2)));
        assert_eq!(tree.len(), 1);
    }
}
