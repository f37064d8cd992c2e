use aftersales_analytics::RecordSet;

fn main() {
    println!("📋 JSON Schema for the record-store boundary\n");
    println!("The form/dashboard surface validates its payloads against this schema.\n");

    match RecordSet::schema_as_json() {
        Ok(schema) => println!("{schema}"),
        Err(e) => eprintln!("Failed to generate schema: {e}"),
    }
}
