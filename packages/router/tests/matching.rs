use pretty_assertions::assert_eq;
use waymark_history::To;
use waymark_router::*;

fn app() -> RouteTree {
    RouteTree::new(vec![Route::new("/").id("root").children([
        Route::index().id("home"),
        Route::new("courses").id("courses").children([
            Route::index().id("courses-index"),
            Route::new(":courseId").id("course"),
            Route::new("new").id("new-course"),
        ]),
        Route::new("files/*").id("files"),
        Route::new("*").id("not-found"),
    ])])
    .unwrap()
}

fn ids(matches: &[RouteMatch]) -> Vec<&str> {
    matches.iter().map(RouteMatch::route_id).collect()
}

#[test]
fn urls_match_the_most_specific_branch() {
    let tree = app();
    let cases = [
        ("/", vec!["root", "home"]),
        ("/courses", vec!["root", "courses", "courses-index"]),
        ("/courses/new", vec!["root", "courses", "new-course"]),
        ("/courses/42", vec!["root", "courses", "course"]),
        ("/COURSES/New", vec!["root", "courses", "new-course"]),
        ("/files/a/b.txt", vec!["root", "files"]),
        ("/nowhere/else", vec!["root", "not-found"]),
    ];
    for (url, expected) in cases {
        let matches = match_routes(&tree, url, None).unwrap();
        assert_eq!(ids(&matches), expected, "matching {url}");
    }
}

// Make sure trailing '/'s work correctly
#[test]
fn trailing_slashes_match() {
    let tree = app();
    let matches = match_routes(&tree, "/courses/42/", None).unwrap();
    assert_eq!(ids(&matches), vec!["root", "courses", "course"]);
    assert_eq!(matches[2].params["courseId"], "42");
}

#[test]
fn params_and_splats() {
    let tree = app();

    let course = match_routes(&tree, "/courses/intro%20to%20rust", None).unwrap();
    assert_eq!(course[2].params["courseId"], "intro to rust");
    assert_eq!(course[1].pathname, "/courses");

    let files = match_routes(&tree, "/files/a/b.txt", None).unwrap();
    assert_eq!(files[1].params["*"], "a/b.txt");
    assert_eq!(files[1].pathname_base, "/files");
}

#[test]
fn basenames_are_stripped_before_matching() {
    let tree = app();
    let matches = match_routes(&tree, "/App/courses/new", Some("/app")).unwrap();
    assert_eq!(ids(&matches), vec!["root", "courses", "new-course"]);
    assert!(match_routes(&tree, "/application/courses", Some("/app")).is_none());
}

#[test]
fn links_resolve_against_the_matched_routes() {
    let tree = app();
    let matches = match_routes(&tree, "/courses/42", None).unwrap();
    let pathnames = get_resolve_to_matches(&matches, false);
    assert_eq!(pathnames, vec!["/", "/courses", "/courses/42"]);

    let resolve = |to: &str| {
        resolve_to(&To::from(to), &pathnames, "/courses/42", false)
            .unwrap()
            .to_string()
    };
    assert_eq!(resolve(".."), "/courses");
    assert_eq!(resolve("../new?draft=1"), "/courses/new?draft=1");
    assert_eq!(resolve("lessons"), "/courses/42/lessons");
    assert_eq!(resolve("/files/x#top"), "/files/x#top");
}

#[test]
fn paths_are_generated_from_params() {
    let mut params = Params::new();
    params.insert("courseId".into(), "42".into());
    assert_eq!(
        generate_path("/courses/:courseId", &params).unwrap(),
        "/courses/42"
    );
    assert!(generate_path("/courses/:courseId/:lesson", &params).is_err());
}

#[test]
fn parent_matches_do_not_see_child_params() {
    let tree = RouteTree::new(vec![Route::new("courses").children([
        Route::index(),
        Route::new(":id"),
    ])])
    .unwrap();
    let matches = match_routes(&tree, "/courses/42", None).unwrap();
    assert_eq!(matches.len(), 2);
    assert!(matches[0].params.is_empty());
    assert_eq!(matches[1].params["id"], "42");
    assert_eq!(matches[1].pathname, "/courses/42");
}
