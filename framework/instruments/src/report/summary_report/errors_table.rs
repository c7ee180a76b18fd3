use tabled::Tabled;

#[derive(Tabled)]
pub struct ErrorRow {
    pub scenario_id: String,
    pub error: String,
    pub count: u64,
}
