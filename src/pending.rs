//! 미완료 청크 인덱스 집합
//!
//! 네트워크 수신 태스크(insert/remove)와 재전송 태스크(drain)가 동시에 접근.
//! 모든 연산은 하나의 뮤텍스로 직렬화되며 내부 순회는 노출하지 않는다.

use std::collections::BTreeSet;

use parking_lot::Mutex;

/// 스레드 안전한 청크 인덱스 집합
#[derive(Debug, Default)]
pub struct PendingSet {
    inner: Mutex<BTreeSet<u64>>,
}

impl PendingSet {
    /// 빈 집합 (송신측)
    pub fn new() -> Self {
        Self::default()
    }

    /// `[0, count)` 로 채운 집합 (수신측)
    pub fn with_range(count: u64) -> Self {
        Self {
            inner: Mutex::new((0..count).collect()),
        }
    }

    pub fn insert(&self, index: u64) {
        self.inner.lock().insert(index);
    }

    /// 제거. 있었으면 true
    pub fn remove(&self, index: u64) -> bool {
        self.inner.lock().remove(&index)
    }

    pub fn contains(&self, index: u64) -> bool {
        self.inner.lock().contains(&index)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// 현재 시점 스냅샷 (오름차순)
    pub fn keys(&self) -> Vec<u64> {
        self.inner.lock().iter().copied().collect()
    }

    /// 임의의 원소 하나를 꺼냄
    pub fn drain_any(&self) -> Option<u64> {
        self.inner.lock().pop_last()
    }

    /// 가장 작은 원소를 꺼냄. 앞쪽 청크부터 채워야 순차 소비자가 빨리 풀린다.
    pub fn drain_lowest(&self) -> Option<u64> {
        self.inner.lock().pop_first()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_basic_operations() {
        let set = PendingSet::new();
        assert!(set.is_empty());
        assert_eq!(set.drain_lowest(), None);
        assert_eq!(set.drain_any(), None);

        set.insert(5);
        set.insert(5);
        set.insert(2);
        set.insert(9);
        assert_eq!(set.len(), 3);
        assert!(set.contains(2));

        assert!(set.remove(9));
        assert!(!set.remove(9));
        assert!(!set.remove(100));
        assert_eq!(set.len(), 2);

        let mut keys = set.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec![2, 5]);
    }

    #[test]
    fn test_drain_lowest() {
        let set = PendingSet::new();
        for index in [7, 3, 11, 0, 4] {
            set.insert(index);
        }

        let mut drained = Vec::new();
        while let Some(index) = set.drain_lowest() {
            drained.push(index);
        }
        assert_eq!(drained, vec![0, 3, 4, 7, 11]);
        assert_eq!(set.drain_lowest(), None);
        assert_eq!(set.drain_any(), None);
    }

    #[test]
    fn test_with_range() {
        let set = PendingSet::with_range(10);
        assert_eq!(set.len(), 10);
        assert_eq!(set.drain_lowest(), Some(0));

        let mut count = 0;
        while set.drain_any().is_some() {
            count += 1;
        }
        assert_eq!(count, 9);
        assert!(PendingSet::with_range(0).is_empty());
    }

    #[test]
    fn test_concurrent_insert_remove() {
        let set = Arc::new(PendingSet::new());
        let threads = 1000u64;

        let handles: Vec<_> = (0..threads)
            .map(|index| {
                let set = set.clone();
                std::thread::spawn(move || set.insert(index))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(set.len(), threads as usize);

        let handles: Vec<_> = (0..threads)
            .map(|index| {
                let set = set.clone();
                std::thread::spawn(move || {
                    set.remove(index);
                    set.len()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_concurrent_drain() {
        let set = Arc::new(PendingSet::with_range(500));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = set.clone();
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(index) = set.drain_lowest() {
                        taken.push(index);
                    }
                    taken
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
    }
}
