mod campaigns_test;
mod helpers;
mod matchups_test;
mod picks_test;
mod users_test;
