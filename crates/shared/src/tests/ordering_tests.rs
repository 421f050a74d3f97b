use super::*;

#[derive(Debug, Clone, PartialEq)]
struct Item {
    name: &'static str,
    rank: i64,
}

impl Ranked for Item {
    fn rank(&self) -> i64 {
        self.rank
    }

    fn set_rank(&mut self, rank: i64) {
        self.rank = rank;
    }
}

fn board(n: i64) -> Vec<Item> {
    const NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];
    (1..=n)
        .map(|rank| Item {
            name: NAMES[(rank - 1) as usize],
            rank,
        })
        .collect()
}

fn rank_of(items: &[Item], name: &str) -> i64 {
    items
        .iter()
        .find(|item| item.name == name)
        .map(|item| item.rank)
        .expect("item present")
}

#[test]
fn moving_last_job_up_shifts_the_middle_down() {
    let mut items = board(5);
    assert!(apply_reorder(&mut items, ReorderRequest::new(5, 2)));

    assert_eq!(rank_of(&items, "e"), 2);
    assert_eq!(rank_of(&items, "b"), 3);
    assert_eq!(rank_of(&items, "c"), 4);
    assert_eq!(rank_of(&items, "d"), 5);
    assert_eq!(rank_of(&items, "a"), 1);
    let names: Vec<_> = items.iter().map(|item| item.name).collect();
    assert_eq!(names, ["a", "e", "b", "c", "d"]);
}

#[test]
fn moving_down_shifts_the_middle_up() {
    let mut items = board(5);
    assert!(apply_reorder(&mut items, ReorderRequest::new(1, 4)));
    let names: Vec<_> = items.iter().map(|item| item.name).collect();
    assert_eq!(names, ["b", "c", "d", "a", "e"]);
}

#[test]
fn every_valid_pair_keeps_the_ranking_dense() {
    for n in 1..=6 {
        for from in 1..=n {
            for to in 1..=n {
                let mut items = board(n);
                let moved = items[(from - 1) as usize].name;
                apply_reorder(&mut items, ReorderRequest::new(from, to));
                assert!(is_dense(&items), "n={n} from={from} to={to}");
                let at_target: Vec<_> = items.iter().filter(|item| item.rank == to).collect();
                assert_eq!(at_target.len(), 1);
                assert_eq!(at_target[0].name, moved);
            }
        }
    }
}

#[test]
fn same_position_is_a_noop() {
    let mut items = board(4);
    let before = items.clone();
    assert!(!apply_reorder(&mut items, ReorderRequest::new(3, 3)));
    assert_eq!(items, before);
}

#[test]
fn partial_view_without_the_moved_element_is_untouched() {
    let mut page: Vec<Item> = board(8).into_iter().skip(5).collect();
    let before = page.clone();
    assert!(!apply_reorder(&mut page, ReorderRequest::new(2, 7)));
    assert_eq!(page, before);
}

#[test]
fn shifted_rank_leaves_outside_ranks_alone() {
    let request = ReorderRequest::new(2, 4);
    assert_eq!(shifted_rank(1, request), 1);
    assert_eq!(shifted_rank(2, request), 4);
    assert_eq!(shifted_rank(3, request), 2);
    assert_eq!(shifted_rank(4, request), 3);
    assert_eq!(shifted_rank(5, request), 5);
}

#[test]
fn detects_gaps_and_duplicates() {
    let mut items = board(3);
    assert!(is_dense(&items));
    items[2].rank = 4;
    assert!(!is_dense(&items));
    items[2].rank = 2;
    assert!(!is_dense(&items));
}

#[test]
fn range_check_reports_the_first_bad_endpoint() {
    assert_eq!(check_range(ReorderRequest::new(1, 5), 5), Ok(()));
    assert_eq!(
        check_range(ReorderRequest::new(0, 9), 5),
        Err(RankOutOfRange {
            field: "from_order",
            value: 0,
            count: 5,
        })
    );
    let err = check_range(ReorderRequest::new(3, 6), 5).unwrap_err();
    assert_eq!(err.field, "to_order");
    assert_eq!(err.to_string(), "to_order must be between 1 and 5, got 6");
    assert!(check_range(ReorderRequest::new(1, 1), 0).is_err());
}
