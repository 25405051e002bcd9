use modbus_io_client::{ClientError, ModbusClient};
use modbus_io_protocol::{ExceptionCode, Request};
use modbus_io_server::server::Builder;
use modbus_io_tests::TestServer;

#[tokio::test]
async fn write_then_read_coil() {
    let server = TestServer::start();
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    client.write_single_coil(2, true).await.unwrap();
    assert!(server.board.coil(2));
    assert_eq!(
        client.read_coils(0, 5).await.unwrap(),
        vec![false, false, true, false, false]
    );

    client
        .write_multiple_coils(0, &[true, true, false, false, true])
        .await
        .unwrap();
    assert_eq!(
        client.read_coils(0, 5).await.unwrap(),
        vec![true, true, false, false, true]
    );
    assert!(!server.board.coil(2));
}

#[tokio::test]
async fn holding_registers_scale_duty_cycle() {
    let server = TestServer::start();
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    client.write_single_register(1, 500).await.unwrap();
    assert_eq!(server.board.pwm(1), 0.5);

    server.board.set_pwm(2, 0.25);
    assert_eq!(
        client.read_holding_registers(0, 4).await.unwrap(),
        vec![0, 500, 250, 0]
    );

    client
        .write_multiple_registers(0, &[1000, 0, 0, 125])
        .await
        .unwrap();
    assert_eq!(server.board.pwm(0), 1.0);
    assert_eq!(server.board.pwm(2), 0.0);
    assert_eq!(server.board.pwm(3), 0.125);
}

#[tokio::test]
async fn reads_sample_live_inputs() {
    let server = TestServer::start();
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    server.board.set_discrete(0, true);
    server.board.set_discrete(3, true);
    server.board.set_analog(5, 4095);
    assert_eq!(
        client.read_discrete_inputs(0, 5).await.unwrap(),
        vec![true, false, false, true, false]
    );
    assert_eq!(
        client.read_input_registers(4, 2).await.unwrap(),
        vec![0, 4095]
    );

    server.board.set_analog(5, 17);
    assert_eq!(client.read_input_registers(5, 1).await.unwrap(), vec![17]);
}

#[tokio::test]
async fn coils_changed_by_hardware_are_visible() {
    let server = TestServer::start();
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    server.board.set_coil(4, true);
    assert_eq!(client.read_coils(4, 1).await.unwrap(), vec![true]);
}

#[tokio::test]
async fn reading_registers_leaves_digital_outputs_alone() {
    let server = TestServer::start();
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    client.read_holding_registers(0, 4).await.unwrap();
    client.read_input_registers(0, 6).await.unwrap();
    client.read_discrete_inputs(0, 5).await.unwrap();
    assert_eq!(server.board.coil_writes(), 0);
    assert_eq!(server.board.pwm_writes(), 0);
}

#[tokio::test]
async fn invalid_requests_get_exceptions() {
    let server = TestServer::start();
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    assert!(matches!(
        client.read_coils(4, 2).await,
        Err(ClientError::Exception(ExceptionCode::IllegalDataAddress))
    ));
    assert!(matches!(
        client.read_input_registers(0, 0).await,
        Err(ClientError::Exception(ExceptionCode::IllegalDataValue))
    ));
    assert!(matches!(
        client.write_single_register(4, 100).await,
        Err(ClientError::Exception(ExceptionCode::IllegalDataAddress))
    ));
    assert!(matches!(
        client
            .call(Request::Other {
                function: 0x2B,
                data: vec![0x0E, 0x01, 0x00].into_boxed_slice(),
            })
            .await,
        Err(ClientError::Exception(ExceptionCode::IllegalFunction))
    ));

    // The connection survives exceptions
    assert_eq!(client.read_coils(0, 1).await.unwrap(), vec![false]);
}

#[tokio::test]
async fn hardware_failure_is_reported() {
    let server = TestServer::start();
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    server.board.set_analog(0, 99);
    server.board.set_failing(true);
    assert!(matches!(
        client.read_input_registers(0, 1).await,
        Err(ClientError::Exception(ExceptionCode::ServerDeviceFailure))
    ));

    server.board.set_failing(false);
    assert_eq!(client.read_input_registers(0, 1).await.unwrap(), vec![99]);
}

#[tokio::test]
async fn report_server_id() {
    let server = TestServer::start_with(
        Builder::new()
            .server_id(0x2A)
            .identification("test bench"),
    );
    let mut client = ModbusClient::connect(server.addr).await.unwrap();

    let identity = client.report_server_id().await.unwrap();
    assert_eq!(identity.server_id(), 0x2A);
    assert_eq!(identity.identification(), b"test bench");
    assert_eq!(server.board.coil_writes(), 0);
}
