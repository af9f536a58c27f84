//! Comparator behavior on the literal cases the index relies on.

use std::cmp::Ordering;

use symdex_core::index::{compare, MatchMode};

#[test]
fn test_match_literals()
{
    assert_eq!(compare("abcd", "abcd", MatchMode::Match), Ordering::Equal);
    assert_eq!(compare("ABCDE", "abcd", MatchMode::Match), Ordering::Greater);
    assert_eq!(compare("name", "name<>", MatchMode::Match), Ordering::Less);
    assert_eq!(compare("name<>", "name", MatchMode::Match), Ordering::Equal);
    assert_eq!(compare("name<arg>", "name<arg>", MatchMode::Match), Ordering::Equal);
    assert_eq!(compare("name<arg>", "name<ag>", MatchMode::Match), Ordering::Greater);
    assert_eq!(compare("", "abcd", MatchMode::Match), Ordering::Less);
    assert_eq!(compare("abcd", "", MatchMode::Match), Ordering::Greater);
}

#[test]
fn test_complete_accepts_any_prefix()
{
    assert_eq!(compare("abcd", "", MatchMode::Complete), Ordering::Equal);
    assert_eq!(compare("abcd", "AB", MatchMode::Complete), Ordering::Equal);
    assert_eq!(compare("name<int>", "name", MatchMode::Complete), Ordering::Equal);
    assert_eq!(compare("ab", "abcd", MatchMode::Complete), Ordering::Less);
}

#[test]
fn test_sort_places_templates_after_plain_name()
{
    assert_eq!(compare("func", "func<type>", MatchMode::Sort), Ordering::Less);
    assert_eq!(compare("func<type>", "func", MatchMode::Sort), Ordering::Greater);
    assert_eq!(compare("func<type>", "func_a", MatchMode::Sort), Ordering::Less);
}

#[test]
fn test_sort_is_case_insensitive()
{
    let mut names = vec!["beta", "Alpha", "alpha<int>", "ALPHA", "gamma"];
    names.sort_by(|a, b| compare(a, b, MatchMode::Sort));
    assert_eq!(&names[..2], &["Alpha", "ALPHA"]);
    assert_eq!(names[2], "alpha<int>");
    assert_eq!(&names[3..], &["beta", "gamma"]);
}
