mod helpers;

mod search_tests;
