use crate::accumulate::FrequencyTable;
use crate::types::OrderPolicy;

/// Orders the distinct values of a discrete attribute for report columns.
///
/// `observed` is the set of values seen across all areas and `all_counts`
/// the attribute's table in the `all` aggregate. `Specific` ignores both
/// and returns the configured list verbatim; `Value` sorts by descending
/// `all` count with a stable sort, so ties keep their observed order.
pub fn order_headings(
    observed: &[String],
    policy: OrderPolicy,
    specific: &[String],
    all_counts: Option<&FrequencyTable>,
) -> Vec<String> {
    let mut headings = observed.to_vec();
    match policy {
        OrderPolicy::Ascending => headings.sort(),
        OrderPolicy::Descending => headings.sort_by(|a, b| b.cmp(a)),
        OrderPolicy::Value => {
            let count = |v: &str| all_counts.map_or(0, |t| t.get(v));
            headings.sort_by(|a, b| count(b).cmp(&count(a)));
        }
        OrderPolicy::Specific => return specific.to_vec(),
        OrderPolicy::Unordered => {}
    }
    headings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn table(values: &[&str]) -> FrequencyTable {
        let mut t = FrequencyTable::default();
        values.iter().for_each(|v| t.observe(v));
        t
    }

    #[test]
    fn lexicographic_orders() {
        let observed = strings(&["D", "B", "C", "A"]);
        assert_eq!(
            order_headings(&observed, OrderPolicy::Ascending, &[], None),
            strings(&["A", "B", "C", "D"])
        );
        assert_eq!(
            order_headings(&observed, OrderPolicy::Descending, &[], None),
            strings(&["D", "C", "B", "A"])
        );
    }

    #[test]
    fn value_order_is_by_count_with_stable_ties() {
        let all = table(&["gas", "oil", "electric", "gas", "lpg", "gas", "oil", "electric"]);
        let observed = all.values().to_vec();
        // gas=3, oil=2, electric=2, lpg=1; oil was seen before electric.
        assert_eq!(
            order_headings(&observed, OrderPolicy::Value, &[], Some(&all)),
            strings(&["gas", "oil", "electric", "lpg"])
        );
    }

    #[test]
    fn specific_returns_configured_list_regardless_of_observed() {
        let specific = strings(&["A", "B", "Z"]);
        for observed in [strings(&[]), strings(&["C", "A"]), strings(&["Q"])] {
            assert_eq!(
                order_headings(&observed, OrderPolicy::Specific, &specific, None),
                specific
            );
        }
    }

    #[test]
    fn unordered_keeps_observed_order() {
        let observed = strings(&["x", "a", "m"]);
        assert_eq!(
            order_headings(&observed, OrderPolicy::Unordered, &[], None),
            observed
        );
    }
}
