binary_layout::binary_layout!(rdm_message_layout, BigEndian, {
    start_code: u8,
    sub_start_code: u8,
    message_length: u8,
    destination_uid: [u8; 6],
    source_uid: [u8; 6],
    transaction_number: u8,
    port_id_response_type: u8,
    message_count: u8,
    sub_device: u16,
    command_class: u8,
    parameter_id: u16,
    parameter_data_length: u8,
    parameter_data_and_checksum: [u8],
});

// Parameter data of DISC_UNIQUE_BRANCH.
binary_layout::binary_layout!(disc_unique_branch_layout, BigEndian, {
    lower_bound_uid: [u8; 6],
    upper_bound_uid: [u8; 6],
});

// Discovery response after the preamble and separator.
binary_layout::binary_layout!(discovery_response_layout, BigEndian, {
    encoded_uid: [u8; 12],
    encoded_checksum: [u8; 4],
});
